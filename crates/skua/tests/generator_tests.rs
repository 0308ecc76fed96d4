//! Generator and coroutine behavior: determinism, delegation, early
//! completion and exception injection.

use pretty_assertions::assert_eq;
use skua::{Object, Runner};

fn eval(source: &str) -> Object {
    Runner::new(source, "test.js")
        .unwrap_or_else(|e| panic!("compile failed for {source}: {e}"))
        .run()
        .unwrap_or_else(|e| panic!("run failed for {source}: {e}"))
}

#[test]
fn pure_generators_are_deterministic() {
    let source = "
        function* g(){ yield 1; yield 2; yield 3; }
        function drain(it){
            let out = [];
            for (const v of it) out.push(v);
            return out;
        }
        const first = drain(g());
        const second = drain(g());
        [first, second]
    ";
    let Object::Array(runs) = eval(source) else {
        panic!("expected an array of runs");
    };
    assert_eq!(runs[0], runs[1]);
    assert_eq!(
        runs[0],
        Object::Array(vec![Object::Number(1.0), Object::Number(2.0), Object::Number(3.0)])
    );
}

#[test]
fn next_arguments_become_yield_results() {
    assert_eq!(
        eval("function* g(){ const a = yield 1; const b = yield a * 2; return b + a; } \
              const it = g(); \
              [it.next().value, it.next(10).value, it.next(5).value, it.next().done]"),
        Object::Array(vec![
            Object::Number(1.0),
            Object::Number(20.0),
            Object::Number(15.0),
            Object::Bool(true),
        ])
    );
}

#[test]
fn yield_resumes_in_the_middle_of_an_expression() {
    // The sent value must land exactly where the yield result belongs,
    // with operands already on the evaluation stack intact.
    assert_eq!(
        eval("function* g(){ const a = 1; return a + (yield 2); } \
              const it = g(); it.next(); it.next(40).value"),
        Object::Number(41.0)
    );
    assert_eq!(
        eval("function* g(){ let sum = 0; sum += yield 1; sum += yield 2; return sum; } \
              const it = g(); it.next(); it.next(10); it.next(20).value"),
        Object::Number(30.0)
    );
    assert_eq!(
        eval("function* g(){ return [1, yield 2, 3]; } \
              const it = g(); it.next(); it.next(9).value"),
        Object::Array(vec![Object::Number(1.0), Object::Number(9.0), Object::Number(3.0)])
    );
}

#[test]
fn generators_suspend_inside_loops() {
    assert_eq!(
        eval("function* nat(){ let n = 0; while (true) yield n++; } \
              const it = nat(); \
              [it.next().value, it.next().value, it.next().value]"),
        Object::Array(vec![Object::Number(0.0), Object::Number(1.0), Object::Number(2.0)])
    );
}

#[test]
fn yield_delegation_flattens_inner_generators() {
    assert_eq!(
        eval("function* inner(){ yield 2; yield 3; } \
              function* outer(){ yield 1; yield* inner(); yield 4; } \
              const out = []; for (const v of outer()) out.push(v); out"),
        Object::Array(vec![
            Object::Number(1.0),
            Object::Number(2.0),
            Object::Number(3.0),
            Object::Number(4.0),
        ])
    );
}

#[test]
fn yield_delegates_to_plain_iterables() {
    assert_eq!(
        eval("function* g(){ yield* [1, 2]; yield 3; } \
              const out = []; for (const v of g()) out.push(v); out"),
        Object::Array(vec![Object::Number(1.0), Object::Number(2.0), Object::Number(3.0)])
    );
}

#[test]
fn return_forces_completion() {
    assert_eq!(
        eval("function* g(){ yield 1; yield 2; } const it = g(); it.next(); \
              const r = it.return(9); [r.value, r.done, it.next().done]"),
        Object::Array(vec![Object::Number(9.0), Object::Bool(true), Object::Bool(true)])
    );
}

#[test]
fn return_still_runs_finally() {
    assert_eq!(
        eval("let cleaned = false; \
              function* g(){ try { yield 1; yield 2; } finally { cleaned = true; } } \
              const it = g(); it.next(); it.return(0); cleaned"),
        Object::Bool(true)
    );
}

#[test]
fn throw_injects_at_the_suspension_point() {
    assert_eq!(
        eval("function* g(){ try { yield 1; yield 2; } catch (e) { yield 'caught:' + e; } } \
              const it = g(); it.next(); it.throw('boom').value"),
        Object::String("caught:boom".to_owned())
    );
}

#[test]
fn throw_without_a_handler_escapes_to_the_caller() {
    let err = Runner::new(
        "function* g(){ yield 1; } const it = g(); it.next(); it.throw('kaboom')",
        "test.js",
    )
    .unwrap()
    .run()
    .unwrap_err();
    assert!(err.message.contains("kaboom"), "{}", err.message);
}

#[test]
fn generator_objects_are_their_own_iterators() {
    assert_eq!(
        eval("function* g(){ yield 7; } const it = g(); const same = it[Symbol.iterator]() === it; same"),
        Object::Bool(true)
    );
}

#[test]
fn generators_capture_enclosing_state() {
    assert_eq!(
        eval("function make(step){ return function* (){ let n = 0; while (n < 3 * step) { yield n; n += step; } }; } \
              const out = []; for (const v of make(2)()) out.push(v); out"),
        Object::Array(vec![Object::Number(0.0), Object::Number(2.0), Object::Number(4.0)])
    );
}
