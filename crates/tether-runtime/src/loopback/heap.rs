//! Object storage for the loopback runtime

use crate::ffi::types::{Finalizer, RawValue, Subr};
use crate::loopback::Loopback;
use std::collections::HashMap;
use std::os::raw::c_void;
use std::rc::Rc;

pub(crate) const NIL: RawValue = RawValue::from_bits(0);
pub(crate) const T: RawValue = RawValue::from_bits(1);

/// Upper arity bound for functions taking any number of arguments
pub(crate) const MANY: usize = usize::MAX;

pub(crate) type Builtin = fn(&Loopback, &[RawValue]) -> RawValue;

pub(crate) enum Body {
    Native(Subr),
    Builtin(Builtin),
}

pub(crate) struct Function {
    pub(crate) min_arity: usize,
    pub(crate) max_arity: usize,
    pub(crate) doc: Option<String>,
    pub(crate) body: Body,
}

pub(crate) enum Object {
    Symbol(String),
    Integer(i64),
    Float(f64),
    Str(String),
    Cons(RawValue, RawValue),
    Vector(Vec<RawValue>),
    UserPtr {
        ptr: *mut c_void,
        finalizer: Option<Finalizer>,
    },
    Function(Rc<Function>),
    /// A user pointer whose finalizer already ran
    Freed,
}

impl Object {
    /// Name of the object's type as reported by `type-of`
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Object::Symbol(_) => "symbol",
            Object::Integer(_) => "integer",
            Object::Float(_) => "float",
            Object::Str(_) => "string",
            Object::Cons(..) => "cons",
            Object::Vector(_) => "vector",
            Object::UserPtr { .. } | Object::Freed => "user-ptr",
            Object::Function(f) => match f.body {
                Body::Native(_) => "module-function",
                Body::Builtin(_) => "subr",
            },
        }
    }
}

/// Every object ever allocated; handles are indices and are never reused
pub(crate) struct Heap {
    objects: Vec<Object>,
    symbols: HashMap<String, RawValue>,
    function_cells: HashMap<RawValue, RawValue>,
    globals: HashMap<RawValue, usize>,
    errors: HashMap<RawValue, String>,
}

impl Heap {
    pub(crate) fn new() -> Self {
        let mut heap = Self {
            objects: Vec::new(),
            symbols: HashMap::new(),
            function_cells: HashMap::new(),
            globals: HashMap::new(),
            errors: HashMap::new(),
        };
        let nil = heap.intern("nil");
        let t = heap.intern("t");
        debug_assert_eq!((nil, t), (NIL, T));
        heap
    }

    pub(crate) fn alloc(&mut self, object: Object) -> RawValue {
        self.objects.push(object);
        RawValue::from_bits(self.objects.len() - 1)
    }

    pub(crate) fn get(&self, raw: RawValue) -> Option<&Object> {
        self.objects.get(raw.bits())
    }

    /// Objects allocated so far; no proper list is longer
    pub(crate) fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn get_mut(&mut self, raw: RawValue) -> Option<&mut Object> {
        self.objects.get_mut(raw.bits())
    }

    pub(crate) fn intern(&mut self, name: &str) -> RawValue {
        if let Some(raw) = self.symbols.get(name) {
            return *raw;
        }
        let raw = self.alloc(Object::Symbol(name.to_string()));
        self.symbols.insert(name.to_string(), raw);
        raw
    }

    pub(crate) fn set_function(&mut self, symbol: RawValue, definition: RawValue) {
        self.function_cells.insert(symbol, definition);
    }

    pub(crate) fn function_cell(&self, symbol: RawValue) -> Option<RawValue> {
        self.function_cells.get(&symbol).copied()
    }

    pub(crate) fn define_builtin(&mut self, name: &str, min_arity: usize, max_arity: usize, body: Builtin) {
        let symbol = self.intern(name);
        let function = self.alloc(Object::Function(Rc::new(Function {
            min_arity,
            max_arity,
            doc: None,
            body: Body::Builtin(body),
        })));
        self.set_function(symbol, function);
    }

    pub(crate) fn define_error(&mut self, symbol: RawValue, message: String) {
        self.errors.insert(symbol, message);
    }

    pub(crate) fn error_message(&self, symbol: RawValue) -> Option<&str> {
        self.errors.get(&symbol).map(String::as_str)
    }

    pub(crate) fn retain(&mut self, raw: RawValue) {
        *self.globals.entry(raw).or_insert(0) += 1;
    }

    /// Drop one global reference; false if none was held
    pub(crate) fn release(&mut self, raw: RawValue) -> bool {
        match self.globals.get_mut(&raw) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.globals.remove(&raw);
                true
            }
            None => false,
        }
    }

    pub(crate) fn global_count(&self, raw: RawValue) -> usize {
        self.globals.get(&raw).copied().unwrap_or(0)
    }

    pub(crate) fn live_globals(&self) -> usize {
        self.globals.values().sum()
    }

    /// Detach a user pointer's finalizer so it can run outside the borrow
    pub(crate) fn take_finalizer(&mut self, raw: RawValue) -> Option<(*mut c_void, Finalizer)> {
        let slot = self.objects.get_mut(raw.bits())?;
        match std::mem::replace(slot, Object::Freed) {
            Object::UserPtr {
                ptr,
                finalizer: Some(finalizer),
            } => Some((ptr, finalizer)),
            Object::UserPtr { finalizer: None, .. } | Object::Freed => None,
            other => {
                *slot = other;
                None
            }
        }
    }

    pub(crate) fn user_ptrs(&self) -> Vec<RawValue> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, object)| matches!(object, Object::UserPtr { .. }))
            .map(|(index, _)| RawValue::from_bits(index))
            .collect()
    }
}
