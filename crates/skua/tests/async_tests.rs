//! Promises, async functions and microtask ordering.

use pretty_assertions::assert_eq;
use skua::{Object, Runner};

fn eval(source: &str) -> Object {
    Runner::new(source, "test.js")
        .unwrap_or_else(|e| panic!("compile failed for {source}: {e}"))
        .run()
        .unwrap_or_else(|e| panic!("run failed for {source}: {e}"))
}

#[test]
fn promises_settle_through_the_microtask_queue() {
    assert_eq!(
        eval("let got = 0; Promise.resolve(41).then(v => { got = v + 1; }); got"),
        // The reaction runs after the synchronous segment; the completion
        // value was read before, but the queue drains before returning.
        Object::Number(0.0)
    );
    assert_eq!(
        eval("let got = 0; Promise.resolve(41).then(v => { got = v + 1; }); await Promise.resolve(0); got"),
        Object::Number(42.0)
    );
}

#[test]
fn then_chains_pass_results_along() {
    assert_eq!(
        eval("const p = Promise.resolve(1).then(v => v + 1).then(v => v * 10); await p"),
        Object::Number(20.0)
    );
}

#[test]
fn executor_resolve_and_reject() {
    assert_eq!(
        eval("await new Promise((resolve, reject) => { resolve('ok'); })"),
        Object::String("ok".to_owned())
    );
    assert_eq!(
        eval("let caught = ''; try { await new Promise((resolve, reject) => reject('no')); } catch (e) { caught = e; } caught"),
        Object::String("no".to_owned())
    );
}

#[test]
fn async_functions_return_promises() {
    assert_eq!(
        eval("async function f(){ return 7; } const p = f(); [typeof p.then, await p]"),
        Object::Array(vec![Object::String("function".to_owned()), Object::Number(7.0)])
    );
}

#[test]
fn await_suspends_and_resumes_with_the_value() {
    assert_eq!(
        eval("async function f(){ const a = await Promise.resolve(40); return a + 2; } await f()"),
        Object::Number(42.0)
    );
}

#[test]
fn async_rejection_is_caught_inside_the_function() {
    assert_eq!(
        eval("async function f(){ try { await Promise.reject('bad'); return 'missed'; } catch (e) { return 'caught:' + e; } } await f()"),
        Object::String("caught:bad".to_owned())
    );
}

#[test]
fn async_functions_run_synchronously_until_the_first_await() {
    assert_eq!(
        eval("let order = ''; async function f(){ order += 'a'; await 0; order += 'c'; } f(); order += 'b'; await 0; order"),
        Object::String("abc".to_owned())
    );
}

#[test]
fn await_on_plain_values_resolves_on_the_next_tick() {
    assert_eq!(eval("async function f(){ return (await 5) + 1; } await f()"), Object::Number(6.0));
}

#[test]
fn finally_callbacks_run_on_settlement() {
    assert_eq!(
        eval("let done = false; Promise.resolve(1).finally(() => { done = true; }); await 0; done"),
        Object::Bool(true)
    );
}

#[test]
fn for_await_iterates_values() {
    assert_eq!(
        eval("async function f(){ let sum = 0; for await (const v of [1, 2, 3]) sum += v; return sum; } await f()"),
        Object::Number(6.0)
    );
}
