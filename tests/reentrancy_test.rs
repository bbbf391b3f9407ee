use std::any::Any;
use std::sync::{Arc, Weak};

use crossgate::engine::{EngineError, Value};
use crossgate::{
    EngineContext, ForwardGate, HostError, HostFn, HostObject, HostValue,
};

#[test]
fn host_engine_host_engine_nesting() {
    let ctx = EngineContext::new();

    // Innermost: an engine adder.
    let add = ctx
        .new_function(|_, _, args| match (args.first(), args.get(1)) {
            (Some(Value::Int(a)), Some(Value::Int(b))) => Ok(Value::Int(a + b)),
            _ => Err(EngineError::type_error("expected two integers")),
        })
        .unwrap();

    // Middle: host code that calls back into the engine through its gate.
    let add_handle = add.clone();
    let host_step = HostFn::new(move |args| {
        let gate = ForwardGate::from_host(&add_handle)
            .ok_or_else(|| HostError::new("adder gate lost"))?;
        gate.call(args).map_err(|e| HostError::new(e.to_string()))
    });

    // Outermost: an engine trampoline invoking the host object.
    let tramp = ctx
        .new_function(|iso, _recv, args| match args.split_first() {
            Some((&callee, rest)) => iso.call(callee, Value::Undefined, rest),
            None => Ok(Value::Undefined),
        })
        .unwrap();
    let tramp_gate = ForwardGate::from_host(&tramp).unwrap();

    // host → engine → host → engine, four frames deep, one lock.
    let out = tramp_gate
        .call(&[
            HostValue::Object(host_step),
            HostValue::Int(2),
            HostValue::Int(3),
        ])
        .unwrap();
    assert_eq!(out, HostValue::Int(5));
}

/// Host object that bounces every call straight back into the engine.
struct Hop {
    bounce: HostValue,
    weak_self: Weak<Hop>,
}

impl HostObject for Hop {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn invoke(&self, args: &[HostValue]) -> Result<HostValue, HostError> {
        let n = match args.first() {
            Some(HostValue::Int(n)) => *n,
            _ => return Err(HostError::new("expected an integer")),
        };
        let gate = ForwardGate::from_host(&self.bounce)
            .ok_or_else(|| HostError::new("bounce gate lost"))?;
        let me = self
            .weak_self
            .upgrade()
            .ok_or_else(|| HostError::new("hop object gone"))?;
        gate.call(&[HostValue::Object(me), HostValue::Int(n)])
            .map_err(|e| HostError::new(e.to_string()))
    }

    fn type_name(&self) -> &'static str {
        "hop"
    }
}

#[test]
fn deep_recursive_crossing() {
    let ctx = EngineContext::new();

    // `bounce(host, n) = n == 0 ? 0 : host(n - 1) + 1`: every step of the
    // countdown crosses the boundary twice.
    let bounce = ctx
        .new_function(|iso, _recv, args| {
            let (host, n) = match (args.first(), args.get(1)) {
                (Some(&h), Some(&Value::Int(n))) => (h, n),
                _ => return Err(EngineError::type_error("expected (callable, int)")),
            };
            if n == 0 {
                return Ok(Value::Int(0));
            }
            match iso.call(host, Value::Undefined, &[Value::Int(n - 1)])? {
                Value::Int(v) => Ok(Value::Int(v + 1)),
                _ => Err(EngineError::type_error("expected an integer back")),
            }
        })
        .unwrap();

    let hop = Arc::new_cyclic(|w| Hop {
        bounce: bounce.clone(),
        weak_self: w.clone(),
    });

    let gate = ForwardGate::from_host(&bounce).unwrap();
    let out = gate
        .call(&[HostValue::Object(hop), HostValue::Int(8)])
        .unwrap();
    assert_eq!(out, HostValue::Int(8));
}

#[test]
fn errors_propagate_out_of_deep_nesting() {
    let ctx = EngineContext::new();

    let tramp = ctx
        .new_function(|iso, _recv, args| match args.split_first() {
            Some((&callee, rest)) => iso.call(callee, Value::Undefined, rest),
            None => Ok(Value::Undefined),
        })
        .unwrap();

    // Host layer that forwards into the engine and annotates nothing:
    // the innermost message must surface unchanged.
    let tramp_handle = tramp.clone();
    let forwarder = HostFn::new(move |args| {
        let gate = ForwardGate::from_host(&tramp_handle)
            .ok_or_else(|| HostError::new("trampoline gate lost"))?;
        gate.call(args).map_err(|e| HostError::new(e.to_string()))
    });

    let failing = HostFn::new(|_| Err(HostError::new("innermost failure")));

    let gate = ForwardGate::from_host(&tramp).unwrap();
    let err = gate
        .call(&[
            HostValue::Object(forwarder),
            HostValue::Object(failing),
        ])
        .unwrap_err();
    assert_eq!(err.to_string(), "innermost failure");
}
