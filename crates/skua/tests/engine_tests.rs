//! End-to-end evaluation scenarios, asserting on the host value surface.

use pretty_assertions::assert_eq;
use skua::{Object, Runner};

fn eval(source: &str) -> Object {
    Runner::new(source, "test.js")
        .unwrap_or_else(|e| panic!("compile failed for {source}: {e}"))
        .run()
        .unwrap_or_else(|e| panic!("run failed for {source}: {e}"))
}

#[test]
fn arithmetic_and_coercions() {
    assert_eq!(eval("1 + 2 * 3"), Object::Number(7.0));
    assert_eq!(eval("'a' + 1"), Object::String("a1".to_owned()));
    assert_eq!(eval("10 % 3"), Object::Number(1.0));
    assert_eq!(eval("2 ** 10"), Object::Number(1024.0));
    assert_eq!(eval("7 / 2"), Object::Number(3.5));
    assert_eq!(eval("'5' - 2"), Object::Number(3.0));
    assert_eq!(eval("1 << 4"), Object::Number(16.0));
    assert_eq!(eval("-9 >>> 28"), Object::Number(15.0));
}

#[test]
fn nan_propagates() {
    let Object::Number(result) = eval("0 / 0 + 1") else {
        panic!("expected a number");
    };
    assert!(result.is_nan());
}

#[test]
fn loop_accumulates_into_outer_binding() {
    // Spec scenario 1.
    assert_eq!(
        eval("let x = 0; for (let i = 0; i < 3; i++) x += i; x"),
        Object::Number(3.0)
    );
}

#[test]
fn generator_yields_in_order() {
    // Spec scenario 2.
    assert_eq!(
        eval("function* g(){ yield 1; yield 2; } const it = g(); [it.next().value, it.next().value, it.next().done]"),
        Object::Array(vec![Object::Number(1.0), Object::Number(2.0), Object::Bool(true)])
    );
}

#[test]
fn catch_then_finally() {
    // Spec scenario 3.
    assert_eq!(
        eval("let s=''; try { throw 'e' } catch(e) { s+='c:'+e } finally { s+=';f' } s"),
        Object::String("c:e;f".to_owned())
    );
}

#[test]
fn optional_chains_short_circuit_to_undefined() {
    // Spec scenario 4.
    assert_eq!(
        eval("const o = { a: { b: 1 } }; [o?.a?.b, o?.x?.b, o?.x?.b ?? 7]"),
        Object::Array(vec![Object::Number(1.0), Object::Undefined, Object::Number(7.0)])
    );
}

#[test]
fn object_destructuring_with_defaults_and_rest() {
    // Spec scenario 5.
    assert_eq!(
        eval("const {a, b=2, ...rest} = {a:1, c:3, d:4}; [a, b, rest.c, rest.d]"),
        Object::Array(vec![
            Object::Number(1.0),
            Object::Number(2.0),
            Object::Number(3.0),
            Object::Number(4.0),
        ])
    );
}

#[test]
fn labelled_continue_targets_the_outer_loop() {
    // Spec scenario 6.
    assert_eq!(
        eval("let acc=0; outer: for (let i=0;i<3;i++) for (let j=0;j<3;j++){ if(j===2) continue outer; acc += 1 } acc"),
        Object::Number(6.0)
    );
}

#[test]
fn array_destructuring_drives_the_iterator_protocol() {
    assert_eq!(
        eval("const [a, , b = 9, ...rest] = [1, 2, undefined, 4, 5]; [a, b, rest]"),
        Object::Array(vec![
            Object::Number(1.0),
            Object::Number(9.0),
            Object::Array(vec![Object::Number(4.0), Object::Number(5.0)]),
        ])
    );
}

#[test]
fn closures_share_their_captured_cell() {
    assert_eq!(
        eval("function counter(){ let n = 0; return function(){ n = n + 1; return n; }; } const c = counter(); c(); c(); c()"),
        Object::Number(3.0)
    );
}

#[test]
fn arrow_functions_capture_this_lexically() {
    assert_eq!(
        eval("const o = { v: 41, m: function(){ const f = () => this.v + 1; return f(); } }; o.m()"),
        Object::Number(42.0)
    );
}

#[test]
fn while_do_while_and_switch() {
    assert_eq!(eval("let i = 0; while (i < 5) i++; i"), Object::Number(5.0));
    assert_eq!(eval("let i = 10; do i--; while (i > 3); i"), Object::Number(3.0));
    assert_eq!(
        eval("function pick(x){ switch(x){ case 1: return 'one'; case 2: return 'two'; default: return 'many'; } } [pick(1), pick(2), pick(9)]"),
        Object::Array(vec![
            Object::String("one".to_owned()),
            Object::String("two".to_owned()),
            Object::String("many".to_owned()),
        ])
    );
}

#[test]
fn switch_falls_through_without_break() {
    assert_eq!(
        eval("let s = ''; switch (1) { case 1: s += 'a'; case 2: s += 'b'; break; case 3: s += 'c'; } s"),
        Object::String("ab".to_owned())
    );
}

#[test]
fn for_of_and_for_in() {
    assert_eq!(
        eval("let sum = 0; for (const v of [1, 2, 3]) sum += v; sum"),
        Object::Number(6.0)
    );
    assert_eq!(
        eval("let keys = ''; for (const k in {a: 1, b: 2}) keys += k; keys"),
        Object::String("ab".to_owned())
    );
    assert_eq!(
        eval("let s = ''; for (const ch of 'abc') s = ch + s; s"),
        Object::String("cba".to_owned())
    );
}

#[test]
fn custom_iterables_conform_to_the_protocol() {
    let source = "
        const iterable = {
            [Symbol.iterator]() {
                let n = 0;
                return { next() { n += 1; return { value: n, done: n > 3 }; } };
            }
        };
        let sum = 0;
        for (const v of iterable) sum += v;
        sum
    ";
    assert_eq!(eval(source), Object::Number(6.0));
}

#[test]
fn templates_interpolate_and_tag() {
    assert_eq!(
        eval("const x = 6; `v=${x * 7}!`"),
        Object::String("v=42!".to_owned())
    );
    assert_eq!(
        eval("function tag(parts, a, b){ return parts[0] + a + parts[1] + b + parts[2]; } tag`x${1}y${2}z`"),
        Object::String("x1y2z".to_owned())
    );
}

#[test]
fn objects_accessors_and_methods() {
    assert_eq!(
        eval("const o = { n: 2, double(){ return this.n * 2; } }; o.double()"),
        Object::Number(4.0)
    );
    assert_eq!(
        eval("let backing = 1; const o = { get v(){ return backing; }, set v(x){ backing = x; } }; o.v = 10; o.v + backing"),
        Object::Number(20.0)
    );
    assert_eq!(
        eval("const base = {a: 1}; const spread = {...base, b: 2}; [spread.a, spread.b]"),
        Object::Array(vec![Object::Number(1.0), Object::Number(2.0)])
    );
}

#[test]
fn typeof_void_delete_and_in() {
    assert_eq!(
        eval("[typeof 1, typeof 'x', typeof undefined, typeof null, typeof (()=>1)]"),
        Object::Array(vec![
            Object::String("number".to_owned()),
            Object::String("string".to_owned()),
            Object::String("undefined".to_owned()),
            Object::String("object".to_owned()),
            Object::String("function".to_owned()),
        ])
    );
    assert_eq!(eval("void 42"), Object::Undefined);
    assert_eq!(
        eval("const o = {a: 1}; const had = 'a' in o; delete o.a; [had, 'a' in o]"),
        Object::Array(vec![Object::Bool(true), Object::Bool(false)])
    );
}

#[test]
fn instanceof_walks_the_prototype_chain() {
    assert_eq!(
        eval("function A(){} const a = new A(); [a instanceof A, ({}) instanceof A]"),
        Object::Array(vec![Object::Bool(true), Object::Bool(false)])
    );
}

#[test]
fn constructors_bind_this() {
    assert_eq!(
        eval("function Point(x, y){ this.x = x; this.y = y; } const p = new Point(3, 4); p.x + p.y"),
        Object::Number(7.0)
    );
}

#[test]
fn classes_lower_to_prototypes() {
    assert_eq!(
        eval("class Point { constructor(x, y){ this.x = x; this.y = y; } norm(){ return this.x * this.x + this.y * this.y; } } new Point(3, 4).norm()"),
        Object::Number(25.0)
    );
    assert_eq!(
        eval("class A { static tag(){ return 'A'; } } A.tag()"),
        Object::String("A".to_owned())
    );
    assert_eq!(
        eval("class B extends Array {} class C {} [new B() instanceof B, new C() instanceof B]"),
        Object::Array(vec![Object::Bool(true), Object::Bool(false)])
    );
}

#[test]
fn loose_and_strict_equality() {
    assert_eq!(
        eval("[1 == '1', 1 === '1', null == undefined, null === undefined, NaN == NaN]"),
        Object::Array(vec![
            Object::Bool(true),
            Object::Bool(false),
            Object::Bool(true),
            Object::Bool(false),
            Object::Bool(false),
        ])
    );
    assert_eq!(
        eval("const o = {}; const p = o; [o === p, o === {}]"),
        Object::Array(vec![Object::Bool(true), Object::Bool(false)])
    );
}

#[test]
fn bigint_arithmetic_stays_exact() {
    assert_eq!(
        eval("(123456789012345678901234567890n + 1n) - 123456789012345678901234567890n"),
        Object::BigInt(1.into())
    );
    assert_eq!(eval("typeof 1n"), Object::String("bigint".to_owned()));
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(
        eval("let hits = 0; function t(){ hits += 1; return true; } false && t(); true || t(); hits"),
        Object::Number(0.0)
    );
    assert_eq!(eval("0 || 'fallback'"), Object::String("fallback".to_owned()));
    assert_eq!(eval("0 ?? 'fallback'"), Object::Number(0.0));
}

#[test]
fn sequence_conditional_and_comma() {
    assert_eq!(eval("(1, 2, 3)"), Object::Number(3.0));
    assert_eq!(eval("true ? 'y' : 'n'"), Object::String("y".to_owned()));
}

#[test]
fn console_output_is_captured() {
    let runner = Runner::new("console.log('hello', 1 + 1); 'done'", "test.js").unwrap();
    let (result, output) = runner.run_collect().unwrap();
    assert_eq!(result, Object::String("done".to_owned()));
    assert_eq!(output, "hello 2\n");
}

#[test]
fn regex_literals_carry_source_and_flags() {
    assert_eq!(
        eval("const r = /a[/]b/gi; [r.source, r.global, r.ignoreCase, r.multiline]"),
        Object::Array(vec![
            Object::String("a[/]b".to_owned()),
            Object::Bool(true),
            Object::Bool(true),
            Object::Bool(false),
        ])
    );
}

#[test]
fn symbols_have_identity() {
    assert_eq!(
        eval("const s = Symbol('tag'); const t = s; [s === t, s === Symbol('tag'), s.description]"),
        Object::Array(vec![
            Object::Bool(true),
            Object::Bool(false),
            Object::String("tag".to_owned()),
        ])
    );
}

#[test]
fn compound_and_logical_assignment() {
    assert_eq!(eval("let x = 8; x *= 2; x -= 1; x"), Object::Number(15.0));
    assert_eq!(eval("let a = null; a ??= 5; a ??= 9; a"), Object::Number(5.0));
    assert_eq!(eval("let b = 1; b ||= 7; b &&= 3; b"), Object::Number(3.0));
}

#[test]
fn update_expressions_in_both_positions() {
    assert_eq!(eval("let i = 5; [i++, i, ++i, i]"), Object::Array(vec![
        Object::Number(5.0),
        Object::Number(6.0),
        Object::Number(7.0),
        Object::Number(7.0),
    ]));
}

#[test]
fn array_spread_merges_in_order() {
    assert_eq!(
        eval("const xs = [2, 3]; [1, ...xs, 4]"),
        Object::Array(vec![
            Object::Number(1.0),
            Object::Number(2.0),
            Object::Number(3.0),
            Object::Number(4.0),
        ])
    );
}

#[test]
fn default_parameters_apply_on_missing_arguments() {
    assert_eq!(
        eval("function f(a, b = a + 1){ return a * 10 + b; } [f(1), f(1, 5)]"),
        Object::Array(vec![Object::Number(12.0), Object::Number(15.0)])
    );
}

#[test]
fn rest_parameters_collect_the_tail() {
    assert_eq!(
        eval("function f(first, ...rest){ return rest.length * 10 + first; } f(1, 2, 3, 4)"),
        Object::Number(31.0)
    );
}
