//! Exception propagation, finalization paths and the error taxonomy.

use pretty_assertions::assert_eq;
use skua::{ErrorKind, Object, Runner};

fn eval(source: &str) -> Object {
    Runner::new(source, "test.js")
        .unwrap_or_else(|e| panic!("compile failed for {source}: {e}"))
        .run()
        .unwrap_or_else(|e| panic!("run failed for {source}: {e}"))
}

fn eval_err(source: &str) -> skua::Exception {
    Runner::new(source, "test.js")
        .unwrap_or_else(|e| panic!("compile failed for {source}: {e}"))
        .run()
        .expect_err("expected the run to fail")
}

#[test]
fn finally_runs_on_every_exit_path() {
    // Fall-through.
    assert_eq!(
        eval("let s=''; try { s+='t' } finally { s+='f' } s"),
        Object::String("tf".to_owned())
    );
    // Return.
    assert_eq!(
        eval("let s=''; function f(){ try { return 'r' } finally { s+='f' } } [f(), s]"),
        Object::Array(vec![Object::String("r".to_owned()), Object::String("f".to_owned())])
    );
    // Break and continue with labels.
    assert_eq!(
        eval("let s=''; outer: for (let i=0;i<2;i++) { try { if (i===1) break outer; s+='i'+i; continue outer; } finally { s+='f' } } s"),
        Object::String("i0ff".to_owned())
    );
    // Thrown.
    assert_eq!(
        eval("let s=''; try { try { throw 'x' } finally { s+='f' } } catch(e) { s+='c' } s"),
        Object::String("fc".to_owned())
    );
}

#[test]
fn nested_finally_unwinds_innermost_first() {
    assert_eq!(
        eval("let s=''; function f(){ try { try { return 1 } finally { s+='inner;' } } finally { s+='outer' } } f(); s"),
        Object::String("inner;outer".to_owned())
    );
}

#[test]
fn catch_rethrow_crosses_to_the_outer_handler() {
    assert_eq!(
        eval("let s=''; try { try { throw 'a' } catch(e) { throw e + 'b' } } catch(e) { s = e } s"),
        Object::String("ab".to_owned())
    );
}

#[test]
fn exceptions_cross_call_boundaries() {
    assert_eq!(
        eval("function inner(){ throw 'deep' } function outer(){ inner() } \
              let got = ''; try { outer() } catch(e) { got = e } got"),
        Object::String("deep".to_owned())
    );
}

#[test]
fn thrown_error_objects_keep_their_shape() {
    assert_eq!(
        eval("let r; try { throw new TypeError('bad thing') } catch(e) { r = [e.name, e.message, e instanceof TypeError] } r"),
        Object::Array(vec![
            Object::String("TypeError".to_owned()),
            Object::String("bad thing".to_owned()),
            Object::Bool(true),
        ])
    );
}

#[test]
fn uncaught_exceptions_surface_with_their_kind() {
    let err = eval_err("null.x");
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("Cannot read properties"), "{}", err.message);

    let err = eval_err("missing_name");
    assert_eq!(err.kind, ErrorKind::ReferenceError);
    assert!(err.message.contains("missing_name is not defined"));

    let err = eval_err("const f = 1; f()");
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn temporal_dead_zone_and_const_reassignment() {
    let err = eval_err("{ x; let x = 1; }");
    assert_eq!(err.kind, ErrorKind::ReferenceError);
    assert!(err.message.contains("before initialization"), "{}", err.message);

    let err = eval_err("const c = 1; c = 2;");
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("constant"), "{}", err.message);
}

#[test]
fn iterating_a_non_iterable_is_a_type_error() {
    let err = eval_err("for (const x of 42) {}");
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("not iterable"), "{}", err.message);
}

#[test]
fn stack_snapshot_reflects_frames_at_raise_time() {
    let err = eval_err("function a(){ b() } function b(){ throw new Error('from b') } a()");
    let names: Vec<&str> = err.frames.iter().map(|f| f.funcname.as_str()).collect();
    assert!(names.contains(&"a"), "{names:?}");
    assert!(names.contains(&"b"), "{names:?}");
    assert!(names.contains(&"<module>"), "{names:?}");
}

#[test]
fn syntax_errors_render_filename_and_caret() {
    let err = Runner::new("let x = @;", "bad.js").unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert!(err.message.contains("bad.js"), "{}", err.message);
}

#[test]
fn deleting_an_identifier_is_rejected_at_compile_time() {
    let err = Runner::new("let a = 1; delete a;", "test.js").unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
}

#[test]
fn modules_are_parse_only() {
    assert!(skua::parser::parse("import {a} from 'm'; export default a;", "m.js").is_ok());
    let err = Runner::new("import {a} from 'm';", "m.js").unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert!(err.message.contains("Modules"), "{}", err.message);
}

#[test]
fn scope_exits_inside_try_still_reach_the_handler() {
    assert_eq!(
        eval("let log=''; for (let i=0;i<3;i++){ try { if (i===1) continue; log+='v'+i; } finally { log+='f'; } } log"),
        Object::String("v0ffv2f".to_owned())
    );
}

#[test]
fn call_depth_is_bounded() {
    let err = eval_err("function f(){ return f(); } f()");
    assert_eq!(err.kind, ErrorKind::RangeError);
    assert!(err.message.contains("call stack"), "{}", err.message);
}
