use crossgate::{EngineContext, HostValue};

fn roundtrip(ctx: &EngineContext, value: HostValue) -> HostValue {
    ctx.set_var("probe", &value).unwrap();
    ctx.var("probe").unwrap()
}

#[test]
fn primitives_round_trip_unchanged() {
    let ctx = EngineContext::new();

    assert_eq!(roundtrip(&ctx, HostValue::Nil), HostValue::Nil);
    assert_eq!(roundtrip(&ctx, HostValue::Bool(true)), HostValue::Bool(true));
    assert_eq!(
        roundtrip(&ctx, HostValue::Bool(false)),
        HostValue::Bool(false)
    );
    assert_eq!(roundtrip(&ctx, HostValue::Int(0)), HostValue::Int(0));
    assert_eq!(roundtrip(&ctx, HostValue::Int(-7)), HostValue::Int(-7));
    assert_eq!(
        roundtrip(&ctx, HostValue::Float(1.21)),
        HostValue::Float(1.21)
    );
    assert_eq!(
        roundtrip(&ctx, HostValue::from("hello world!")),
        HostValue::from("hello world!")
    );
}

#[test]
fn undefined_and_nil_stay_distinguishable() {
    let ctx = EngineContext::new();

    assert_eq!(roundtrip(&ctx, HostValue::Undefined), HostValue::Undefined);
    assert_eq!(roundtrip(&ctx, HostValue::Nil), HostValue::Nil);
    assert_ne!(roundtrip(&ctx, HostValue::Undefined), HostValue::Nil);

    // An unbound name reads as undefined, not nil.
    assert_eq!(ctx.var("never_bound").unwrap(), HostValue::Undefined);
}

#[test]
fn thirty_two_bit_integers_stay_exact() {
    let ctx = EngineContext::new();

    for i in [i64::from(i32::MAX), i64::from(i32::MIN), 0, 1, -1] {
        assert_eq!(roundtrip(&ctx, HostValue::Int(i)), HostValue::Int(i));
    }
}

#[test]
fn oversized_integers_degrade_to_floats() {
    let ctx = EngineContext::new();

    let big = i64::from(i32::MAX) + 1;
    assert_eq!(
        roundtrip(&ctx, HostValue::Int(big)),
        HostValue::Float(big as f64)
    );
}

#[test]
fn utf8_text_survives() {
    let ctx = EngineContext::new();

    let text = "héllo wörld — ≤≥ 日本語";
    assert_eq!(roundtrip(&ctx, HostValue::from(text)), HostValue::from(text));
}
