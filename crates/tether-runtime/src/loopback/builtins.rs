//! Primitive functions of the loopback runtime
//!
//! Only what the crate itself calls plus a few helpers tests use to build
//! data. Failures follow the runtime convention: set a pending signal and
//! return nil.

use crate::ffi::host::Host;
use crate::ffi::types::RawValue;
use crate::loopback::heap::{Heap, Object, MANY, NIL, T};
use crate::loopback::Loopback;

pub(crate) fn install(heap: &mut Heap) {
    heap.define_builtin("list", 0, MANY, list);
    heap.define_builtin("cons", 2, 2, cons);
    heap.define_builtin("car", 1, 1, car);
    heap.define_builtin("cdr", 1, 1, cdr);
    heap.define_builtin("setcdr", 2, 2, setcdr);
    heap.define_builtin("vector", 0, MANY, vector);
    heap.define_builtin("length", 1, 1, length);
    heap.define_builtin("aref", 2, 2, aref);
    heap.define_builtin("symbol-name", 1, 1, symbol_name);
    heap.define_builtin("symbol-function", 1, 1, symbol_function);
    heap.define_builtin("defalias", 2, 3, defalias);
    heap.define_builtin("fset", 2, 2, fset);
    heap.define_builtin("define-error", 2, 3, define_error);
    heap.define_builtin("signal", 2, 2, signal);
    heap.define_builtin("throw", 2, 2, throw);
    heap.define_builtin("identity", 1, 1, identity);
    heap.define_builtin("funcall", 1, MANY, funcall);
    heap.define_builtin("+", 0, MANY, plus);
    heap.define_builtin("concat", 0, MANY, concat);
}

fn list(rt: &Loopback, args: &[RawValue]) -> RawValue {
    rt.make_list(args)
}

fn cons(rt: &Loopback, args: &[RawValue]) -> RawValue {
    rt.alloc(Object::Cons(args[0], args[1]))
}

fn car(rt: &Loopback, args: &[RawValue]) -> RawValue {
    match rt.with_object(args[0], |o| match o {
        Some(Object::Cons(first, _)) => Some(*first),
        _ => None,
    }) {
        Some(first) => first,
        None if args[0] == NIL => NIL,
        None => rt.wrong_type("listp", args[0]),
    }
}

fn cdr(rt: &Loopback, args: &[RawValue]) -> RawValue {
    match rt.with_object(args[0], |o| match o {
        Some(Object::Cons(_, rest)) => Some(*rest),
        _ => None,
    }) {
        Some(rest) => rest,
        None if args[0] == NIL => NIL,
        None => rt.wrong_type("listp", args[0]),
    }
}

fn setcdr(rt: &Loopback, args: &[RawValue]) -> RawValue {
    let updated = match rt.heap_mut().get_mut(args[0]) {
        Some(Object::Cons(_, rest)) => {
            *rest = args[1];
            true
        }
        _ => false,
    };
    if updated {
        args[1]
    } else {
        rt.wrong_type("consp", args[0])
    }
}

fn vector(rt: &Loopback, args: &[RawValue]) -> RawValue {
    rt.alloc(Object::Vector(args.to_vec()))
}

fn length(rt: &Loopback, args: &[RawValue]) -> RawValue {
    if args[0] == NIL {
        return rt.make_integer(0);
    }
    let len = rt.with_object(args[0], |o| match o {
        Some(Object::Vector(items)) => Some(items.len()),
        Some(Object::Str(s)) => Some(s.chars().count()),
        _ => None,
    });
    match len {
        Some(len) => rt.make_integer(len as i64),
        None if rt.type_name(args[0]).as_deref() == Some("cons") => {
            rt.make_integer(rt.list_items(args[0]).len() as i64)
        }
        None => rt.wrong_type("sequencep", args[0]),
    }
}

fn aref(rt: &Loopback, args: &[RawValue]) -> RawValue {
    let Some(index) = rt.integer(args[1]) else {
        return rt.wrong_type("integerp", args[1]);
    };
    let item = rt.with_object(args[0], |o| match o {
        Some(Object::Vector(items)) => Some(
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i).copied()),
        ),
        _ => None,
    });
    match item {
        Some(Some(item)) => item,
        Some(None) => rt.signal_error("args-out-of-range", &[args[0], args[1]]),
        None => rt.wrong_type("arrayp", args[0]),
    }
}

fn symbol_name(rt: &Loopback, args: &[RawValue]) -> RawValue {
    match rt.symbol_name(args[0]) {
        Some(name) => rt.make_string(&name),
        None => rt.wrong_type("symbolp", args[0]),
    }
}

fn symbol_function(rt: &Loopback, args: &[RawValue]) -> RawValue {
    if rt.symbol_name(args[0]).is_none() {
        return rt.wrong_type("symbolp", args[0]);
    }
    rt.heap().function_cell(args[0]).unwrap_or(NIL)
}

fn fset_cell(rt: &Loopback, symbol: RawValue, definition: RawValue) -> bool {
    if rt.symbol_name(symbol).is_none() || symbol == NIL || symbol == T {
        rt.wrong_type("symbolp", symbol);
        return false;
    }
    rt.heap_mut().set_function(symbol, definition);
    true
}

fn defalias(rt: &Loopback, args: &[RawValue]) -> RawValue {
    if fset_cell(rt, args[0], args[1]) {
        args[0]
    } else {
        NIL
    }
}

fn fset(rt: &Loopback, args: &[RawValue]) -> RawValue {
    if fset_cell(rt, args[0], args[1]) {
        args[1]
    } else {
        NIL
    }
}

fn define_error(rt: &Loopback, args: &[RawValue]) -> RawValue {
    if rt.symbol_name(args[0]).is_none() {
        return rt.wrong_type("symbolp", args[0]);
    }
    let Some(message) = rt.string(args[1]) else {
        return rt.wrong_type("stringp", args[1]);
    };
    rt.heap_mut().define_error(args[0], message);
    NIL
}

fn signal(rt: &Loopback, args: &[RawValue]) -> RawValue {
    rt.non_local_exit_signal(args[0], args[1]);
    NIL
}

fn throw(rt: &Loopback, args: &[RawValue]) -> RawValue {
    rt.non_local_exit_throw(args[0], args[1]);
    NIL
}

fn identity(_rt: &Loopback, args: &[RawValue]) -> RawValue {
    args[0]
}

fn funcall(rt: &Loopback, args: &[RawValue]) -> RawValue {
    rt.funcall(args[0], &args[1..])
}

fn plus(rt: &Loopback, args: &[RawValue]) -> RawValue {
    let mut sum: i64 = 0;
    for arg in args {
        match rt.integer(*arg) {
            Some(n) => sum = sum.wrapping_add(n),
            None => return rt.wrong_type("number-or-marker-p", *arg),
        }
    }
    rt.make_integer(sum)
}

fn concat(rt: &Loopback, args: &[RawValue]) -> RawValue {
    let mut out = String::new();
    for arg in args {
        match rt.string(*arg) {
            Some(s) => out.push_str(&s),
            None if *arg == NIL => {}
            None => return rt.wrong_type("sequencep", *arg),
        }
    }
    rt.make_string(&out)
}
