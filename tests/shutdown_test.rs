use std::sync::Arc;

use crossgate::{BridgeError, EngineContext, ForwardGate, HostFn, HostValue};

#[test]
fn shutdown_invalidates_every_registered_gate() {
    let ctx = EngineContext::new();
    let obj = ctx.new_object(&[("x", HostValue::Int(1))]).unwrap();
    let arr = ctx.new_array(&[HostValue::Int(2)]).unwrap();
    let host_obj = HostFn::new(|_| Ok(HostValue::Nil));
    ctx.set_var("o", &HostValue::Object(host_obj.clone())).unwrap();
    assert_eq!(ctx.live_gates(), 3);

    ctx.shutdown();
    assert_eq!(ctx.live_gates(), 0);

    // Forward gates survive as host objects but every operation reports
    // the dead context: no stale dereference, no corruption.
    for gated in [&obj, &arr] {
        let gate = ForwardGate::from_host(gated).unwrap();
        assert!(!gate.is_live());
        assert_eq!(gate.to_text().unwrap_err(), BridgeError::ContextGone);
        assert_eq!(
            gate.get_attribute("x").unwrap_err(),
            BridgeError::ContextGone
        );
        assert_eq!(gate.call(&[]).unwrap_err(), BridgeError::ContextGone);
    }

    // The reverse gate released its host reference at shutdown.
    assert_eq!(Arc::strong_count(&host_obj), 1);
}

#[test]
fn context_operations_fail_after_shutdown() {
    let ctx = EngineContext::new();
    ctx.shutdown();

    assert_eq!(
        ctx.set_var("x", &HostValue::Int(1)).unwrap_err(),
        BridgeError::ContextGone
    );
    assert_eq!(ctx.var("x").unwrap_err(), BridgeError::ContextGone);
    assert_eq!(
        ctx.new_object(&[]).unwrap_err(),
        BridgeError::ContextGone
    );
    assert_eq!(ctx.new_array(&[]).unwrap_err(), BridgeError::ContextGone);
    assert_eq!(
        ctx.collect_garbage().unwrap_err(),
        BridgeError::ContextGone
    );
}

#[test]
fn gates_may_be_dropped_after_shutdown() {
    let ctx = EngineContext::new();
    let obj = ctx.new_object(&[]).unwrap();
    let f = ctx
        .new_function(|_, _, _| Ok(crossgate::engine::Value::Null))
        .unwrap();

    ctx.shutdown();

    // Reclamation after invalidation must be clean: the gates were already
    // soft-freed, dropping them is a no-op release.
    drop(obj);
    drop(f);
    assert_eq!(ctx.live_gates(), 0);
}

#[test]
fn soft_freed_gate_is_unaffected_by_later_shutdown() {
    let ctx = EngineContext::new();
    let obj = ctx.new_object(&[]).unwrap();
    let gate = ForwardGate::from_host(&obj).unwrap();

    gate.soft_free();
    ctx.shutdown();

    // First release wins: the gate reports host-side staleness, not the
    // context teardown that came second.
    assert_eq!(gate.to_text().unwrap_err(), BridgeError::StaleGate);
}

#[test]
fn session_outlives_the_context_handle_while_gates_survive() {
    let ctx = EngineContext::new();
    let obj = ctx.new_object(&[("x", HostValue::Int(42))]).unwrap();

    // Dropping the handle does not end the session: the forward gate's
    // strong edge anchors it.
    drop(ctx);
    let gate = ForwardGate::from_host(&obj).unwrap();
    assert_eq!(gate.get_attribute("x").unwrap(), HostValue::Int(42));
}
