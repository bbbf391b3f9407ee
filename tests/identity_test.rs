use std::sync::Arc;

use crossgate::{EngineContext, ForwardGate, HostFn, HostValue};

#[test]
fn host_objects_come_back_with_the_same_identity() {
    let ctx = EngineContext::new();
    let original = HostFn::new(|_| Ok(HostValue::Nil));

    ctx.set_var("o", &HostValue::Object(original.clone()))
        .unwrap();
    let back = ctx.var("o").unwrap();

    // Identity, not a new proxy: the tag on the engine wrapper makes the
    // round trip transparent.
    match &back {
        HostValue::Object(r) => assert!(Arc::ptr_eq(r, &original)),
        other => panic!("expected an object back, got {other:?}"),
    }
    assert_eq!(back, HostValue::Object(original));
}

#[test]
fn host_object_identity_survives_repeated_crossings() {
    let ctx = EngineContext::new();
    let original = HostFn::new(|_| Ok(HostValue::Nil));
    let value = HostValue::Object(original.clone());

    ctx.set_var("a", &value).unwrap();
    let once = ctx.var("a").unwrap();
    ctx.set_var("b", &once).unwrap();
    let twice = ctx.var("b").unwrap();

    assert_eq!(twice, HostValue::Object(original));
}

#[test]
fn forward_gates_unwrap_to_the_same_engine_object() {
    let ctx = EngineContext::new();
    let obj = ctx.new_object(&[("x", HostValue::Int(1))]).unwrap();

    // Passing the gated value back in must reuse the engine object rather
    // than wrapping the wrapper.
    ctx.set_var("same", &obj).unwrap();
    let again = ctx.var("same").unwrap();

    let first = ForwardGate::from_host(&obj).unwrap();
    let second = ForwardGate::from_host(&again).unwrap();

    // Writes through one wrapper are visible through the other.
    first.set_attribute("y", &HostValue::Int(5)).unwrap();
    assert_eq!(second.get_attribute("y").unwrap(), HostValue::Int(5));
}

#[test]
fn repeated_conversion_yields_distinct_wrappers() {
    let ctx = EngineContext::new();
    let obj = ctx.new_object(&[]).unwrap();
    ctx.set_var("o", &obj).unwrap();

    let a = ctx.var("o").unwrap();
    let b = ctx.var("o").unwrap();

    // No wrapper caching: two conversions, two gates.
    assert_ne!(a, b);

    // Both still address the same engine object.
    ForwardGate::from_host(&a)
        .unwrap()
        .set_attribute("k", &HostValue::Int(9))
        .unwrap();
    assert_eq!(
        ForwardGate::from_host(&b)
            .unwrap()
            .get_attribute("k")
            .unwrap(),
        HostValue::Int(9)
    );
}
