//! In-process foreign runtime
//!
//! `Loopback` implements [`Host`] with a small single-threaded object heap:
//! symbols, numbers, strings, cons cells, vectors, user pointers and
//! functions. It follows the real runtime's conventions closely enough to
//! exercise the whole crate without one:
//! - primitives report failure through a pending non-local exit
//! - functions carry an arity range that `funcall` enforces
//! - user pointers run their finalizer exactly once
//! - channel pipes are drained by [`Loopback::pump`], which plays the main loop
//!
//! # Example
//!
//! ```
//! use tether_runtime::loopback::Loopback;
//!
//! let rt = Loopback::new();
//! let list = rt.call("list", &[rt.make_int(1), rt.make_int(2)]).unwrap();
//! assert_eq!(rt.list_items(list).len(), 2);
//! ```

mod builtins;
mod heap;

use crate::ffi::host::Host;
use crate::ffi::types::{ExitKind, Finalizer, RawValue, Subr};
use heap::{Body, Function, Heap, Object, NIL, T};
use parking_lot::Mutex;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::io;
use std::os::raw::c_void;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Longest chain of symbol aliases `funcall` follows
const MAX_ALIAS_DEPTH: usize = 32;

/// A non-local exit observed by the main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    pub kind: ExitKind,
    /// Error symbol, or the tag of a throw
    pub symbol: RawValue,
    /// Error data, or the value of a throw
    pub data: RawValue,
}

/// What one pass of the main loop delivered
#[derive(Debug, Default)]
pub struct PumpReport {
    /// Relay calls made
    pub chunks: usize,
    /// Exits the relay calls ended with
    pub exits: Vec<Exit>,
}

#[derive(Default)]
struct PipeShared {
    bytes: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

struct PipeWriter {
    shared: Arc<PipeShared>,
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        self.shared.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Pipe {
    relay: RawValue,
    shared: Arc<PipeShared>,
}

/// Single-threaded in-process runtime
pub struct Loopback {
    heap: RefCell<Heap>,
    exit: Cell<(ExitKind, RawValue, RawValue)>,
    pipes: RefCell<Vec<Pipe>>,
}

impl Loopback {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        builtins::install(&mut heap);
        Self {
            heap: RefCell::new(heap),
            exit: Cell::new((ExitKind::Return, NIL, NIL)),
            pipes: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn heap(&self) -> Ref<'_, Heap> {
        self.heap.borrow()
    }

    pub(crate) fn heap_mut(&self) -> RefMut<'_, Heap> {
        self.heap.borrow_mut()
    }

    pub(crate) fn alloc(&self, object: Object) -> RawValue {
        self.heap_mut().alloc(object)
    }

    pub(crate) fn with_object<R>(&self, raw: RawValue, f: impl FnOnce(Option<&Object>) -> R) -> R {
        f(self.heap().get(raw))
    }

    /// Signal `name` with a list of `data`; returns nil
    pub(crate) fn signal_error(&self, name: &str, data: &[RawValue]) -> RawValue {
        let symbol = self.intern(name);
        let data = self.make_list(data);
        self.non_local_exit_signal(symbol, data);
        NIL
    }

    pub(crate) fn wrong_type(&self, predicate: &str, value: RawValue) -> RawValue {
        let predicate = self.intern(predicate);
        self.signal_error("wrong-type-argument", &[predicate, value])
    }

    fn resolve_function(&self, function: RawValue) -> Option<Rc<Function>> {
        let heap = self.heap();
        let mut current = function;
        for _ in 0..MAX_ALIAS_DEPTH {
            match heap.get(current)? {
                Object::Function(f) => return Some(Rc::clone(f)),
                Object::Symbol(_) => current = heap.function_cell(current)?,
                _ => return None,
            }
        }
        None
    }

    fn take_exit(&self) -> Result<(), Exit> {
        let (kind, symbol, data) = self.exit.get();
        if kind == ExitKind::Return {
            return Ok(());
        }
        self.non_local_exit_clear();
        Err(Exit { kind, symbol, data })
    }

    // Entry points used in place of the runtime's own evaluator

    /// Call a function by name, as foreign code would
    pub fn call(&self, name: &str, args: &[RawValue]) -> Result<RawValue, Exit> {
        let function = self.intern(name);
        self.call_value(function, args)
    }

    /// Call a function value, as foreign code would
    pub fn call_value(&self, function: RawValue, args: &[RawValue]) -> Result<RawValue, Exit> {
        let result = self.funcall(function, args);
        self.take_exit().map(|()| result)
    }

    /// Deliver everything written to channel pipes to their relays
    pub fn pump(&self) -> PumpReport {
        self.pump_with(None)
    }

    /// Like [`Loopback::pump`], but hand data over in chunks of at most `size` bytes
    pub fn pump_in_chunks(&self, size: usize) -> PumpReport {
        self.pump_with(Some(size.max(1)))
    }

    /// Pump until the pipes stay empty, also delivering notifications
    /// written by the callbacks themselves
    pub fn pump_until_idle(&self) -> PumpReport {
        let mut report = PumpReport::default();
        loop {
            let pass = self.pump();
            if pass.chunks == 0 {
                return report;
            }
            report.chunks += pass.chunks;
            report.exits.extend(pass.exits);
        }
    }

    fn pump_with(&self, chunk_size: Option<usize>) -> PumpReport {
        // Relays may open further channels, so no borrow is held while they run
        let pipes: Vec<(RawValue, Arc<PipeShared>)> = self
            .pipes
            .borrow()
            .iter()
            .map(|pipe| (pipe.relay, Arc::clone(&pipe.shared)))
            .collect();

        let mut report = PumpReport::default();
        for (relay, shared) in pipes {
            let bytes = std::mem::take(&mut *shared.bytes.lock());
            if bytes.is_empty() {
                continue;
            }
            let size = chunk_size.unwrap_or(bytes.len());
            for piece in bytes.chunks(size) {
                let text = self.make_string(&String::from_utf8_lossy(piece));
                report.chunks += 1;
                trace!(bytes = piece.len(), "delivering channel chunk");
                if let Err(exit) = self.call_value(relay, &[text]) {
                    report.exits.push(exit);
                }
            }
        }
        report
    }

    /// Make every pipe reject further writes
    pub fn close_pipes(&self) {
        for pipe in self.pipes.borrow().iter() {
            pipe.shared.closed.store(true, Ordering::Release);
        }
    }

    /// Bytes written to pipes and not yet pumped
    pub fn pending_bytes(&self) -> usize {
        self.pipes
            .borrow()
            .iter()
            .map(|pipe| pipe.shared.bytes.lock().len())
            .sum()
    }

    pub fn channel_count(&self) -> usize {
        self.pipes.borrow().len()
    }

    /// Free a user pointer the way the garbage collector would
    ///
    /// Runs the finalizer once; freeing again does nothing.
    pub fn free_object(&self, value: RawValue) {
        let finalizer = self.heap_mut().take_finalizer(value);
        if let Some((ptr, finalizer)) = finalizer {
            // SAFETY: the finalizer was registered together with this pointer
            // and has been detached, so it cannot run a second time.
            unsafe { finalizer(ptr) };
        }
    }

    // Constructors and inspectors for tests and examples

    pub fn make_int(&self, value: i64) -> RawValue {
        self.make_integer(value)
    }

    pub fn make_str(&self, value: &str) -> RawValue {
        self.make_string(value)
    }

    pub fn make_list(&self, items: &[RawValue]) -> RawValue {
        items
            .iter()
            .rev()
            .fold(NIL, |rest, item| self.alloc(Object::Cons(*item, rest)))
    }

    pub fn integer(&self, value: RawValue) -> Option<i64> {
        self.with_object(value, |o| match o {
            Some(Object::Integer(n)) => Some(*n),
            _ => None,
        })
    }

    pub fn float(&self, value: RawValue) -> Option<f64> {
        self.with_object(value, |o| match o {
            Some(Object::Float(f)) => Some(*f),
            _ => None,
        })
    }

    pub fn string(&self, value: RawValue) -> Option<String> {
        self.with_object(value, |o| match o {
            Some(Object::Str(s)) => Some(s.clone()),
            _ => None,
        })
    }

    pub fn symbol_name(&self, value: RawValue) -> Option<String> {
        self.with_object(value, |o| match o {
            Some(Object::Symbol(name)) => Some(name.clone()),
            _ => None,
        })
    }

    pub fn type_name(&self, value: RawValue) -> Option<String> {
        self.with_object(value, |o| o.map(|object| object.type_name().to_string()))
    }

    /// Elements of a proper list; stops at the first non-cons tail
    ///
    /// A circular list is cut off once it is longer than the heap.
    pub fn list_items(&self, list: RawValue) -> Vec<RawValue> {
        let limit = self.heap().object_count();
        let mut items = Vec::new();
        let mut cursor = list;
        while let Some((item, rest)) = self.with_object(cursor, |o| match o {
            Some(Object::Cons(item, rest)) => Some((*item, *rest)),
            _ => None,
        }) {
            if items.len() >= limit {
                break;
            }
            items.push(item);
            cursor = rest;
        }
        items
    }

    /// Documentation of a function value or of the function a symbol names
    pub fn function_doc(&self, function: RawValue) -> Option<String> {
        self.resolve_function(function)
            .and_then(|f| f.doc.clone())
    }

    /// Message an error symbol was defined with
    pub fn error_message(&self, symbol: &str) -> Option<String> {
        let symbol = self.intern(symbol);
        self.heap().error_message(symbol).map(str::to_string)
    }

    /// First string in an exit's data, the usual place for a message
    pub fn exit_message(&self, exit: &Exit) -> Option<String> {
        self.list_items(exit.data)
            .into_iter()
            .find_map(|item| self.string(item))
    }

    pub fn global_ref_count(&self, value: RawValue) -> usize {
        self.heap().global_count(value)
    }

    /// Global references currently held, counting duplicates
    pub fn live_global_refs(&self) -> usize {
        self.heap().live_globals()
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Loopback {
    fn drop(&mut self) {
        let user_ptrs = self.heap().user_ptrs();
        for raw in user_ptrs {
            self.free_object(raw);
        }
    }
}

impl Host for Loopback {
    fn intern(&self, name: &str) -> RawValue {
        self.heap_mut().intern(name)
    }

    fn type_of(&self, value: RawValue) -> RawValue {
        match self.with_object(value, |o| o.map(Object::type_name)) {
            Some(name) => self.intern(name),
            None => self.signal_error("invalid-object", &[]),
        }
    }

    fn is_not_nil(&self, value: RawValue) -> bool {
        value != NIL
    }

    fn eq(&self, a: RawValue, b: RawValue) -> bool {
        if a == b {
            return true;
        }
        // Integers compare by value, like fixnums
        matches!((self.integer(a), self.integer(b)), (Some(x), Some(y)) if x == y)
    }

    fn make_integer(&self, value: i64) -> RawValue {
        self.alloc(Object::Integer(value))
    }

    fn extract_integer(&self, value: RawValue) -> i64 {
        match self.integer(value) {
            Some(n) => n,
            None => {
                self.wrong_type("integerp", value);
                0
            }
        }
    }

    fn make_float(&self, value: f64) -> RawValue {
        self.alloc(Object::Float(value))
    }

    fn extract_float(&self, value: RawValue) -> f64 {
        match self.float(value) {
            Some(f) => f,
            None => {
                self.wrong_type("floatp", value);
                0.0
            }
        }
    }

    fn make_string(&self, value: &str) -> RawValue {
        self.alloc(Object::Str(value.to_string()))
    }

    fn copy_string_contents(&self, value: RawValue) -> Option<String> {
        let contents = self.string(value);
        if contents.is_none() {
            self.wrong_type("stringp", value);
        }
        contents
    }

    fn make_user_ptr(&self, finalizer: Option<Finalizer>, ptr: *mut c_void) -> RawValue {
        self.alloc(Object::UserPtr { ptr, finalizer })
    }

    fn get_user_ptr(&self, value: RawValue) -> *mut c_void {
        match self.with_object(value, |o| match o {
            Some(Object::UserPtr { ptr, .. }) => Some(*ptr),
            _ => None,
        }) {
            Some(ptr) => ptr,
            None => {
                self.wrong_type("user-ptrp", value);
                std::ptr::null_mut()
            }
        }
    }

    fn get_user_finalizer(&self, value: RawValue) -> Option<Finalizer> {
        match self.with_object(value, |o| match o {
            Some(Object::UserPtr { finalizer, .. }) => Some(*finalizer),
            _ => None,
        }) {
            Some(finalizer) => finalizer,
            None => {
                self.wrong_type("user-ptrp", value);
                None
            }
        }
    }

    fn make_function(&self, min_arity: usize, max_arity: usize, doc: Option<&str>, subr: Subr) -> RawValue {
        self.alloc(Object::Function(Rc::new(Function {
            min_arity,
            max_arity,
            doc: doc.map(str::to_string),
            body: Body::Native(subr),
        })))
    }

    fn funcall(&self, function: RawValue, args: &[RawValue]) -> RawValue {
        let Some(resolved) = self.resolve_function(function) else {
            let name = if self.symbol_name(function).is_some() {
                "void-function"
            } else {
                "invalid-function"
            };
            return self.signal_error(name, &[function]);
        };

        if args.len() < resolved.min_arity || args.len() > resolved.max_arity {
            let count = self.make_integer(args.len() as i64);
            return self.signal_error("wrong-number-of-arguments", &[function, count]);
        }

        match &resolved.body {
            Body::Native(subr) => subr(self, args),
            Body::Builtin(builtin) => builtin(self, args),
        }
    }

    fn non_local_exit_check(&self) -> ExitKind {
        self.exit.get().0
    }

    fn non_local_exit_get(&self) -> (ExitKind, RawValue, RawValue) {
        self.exit.get()
    }

    fn non_local_exit_clear(&self) {
        self.exit.set((ExitKind::Return, NIL, NIL));
    }

    fn non_local_exit_signal(&self, symbol: RawValue, data: RawValue) {
        // The first exit wins until it is cleared
        if self.non_local_exit_check() == ExitKind::Return {
            self.exit.set((ExitKind::Signal, symbol, data));
        }
    }

    fn non_local_exit_throw(&self, tag: RawValue, value: RawValue) {
        if self.non_local_exit_check() == ExitKind::Return {
            self.exit.set((ExitKind::Throw, tag, value));
        }
    }

    fn make_global_ref(&self, value: RawValue) -> RawValue {
        self.heap_mut().retain(value);
        value
    }

    fn free_global_ref(&self, value: RawValue) {
        if !self.heap_mut().release(value) {
            trace!(?value, "freeing a value without a global reference");
        }
    }

    fn open_channel(&self, relay: RawValue) -> io::Result<Box<dyn io::Write + Send>> {
        if self.resolve_function(relay).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "relay is not a function",
            ));
        }
        self.make_global_ref(relay);
        let shared = Arc::new(PipeShared::default());
        self.pipes.borrow_mut().push(Pipe {
            relay,
            shared: Arc::clone(&shared),
        });
        Ok(Box::new(PipeWriter { shared }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_t_is_not_nil() {
        let rt = Loopback::new();
        assert!(rt.is_not_nil(T));
        assert!(!rt.is_not_nil(NIL));
        assert_eq!(rt.intern("t"), T);
    }

    #[test]
    fn test_first_signal_wins() {
        let rt = Loopback::new();
        let a = rt.intern("a");
        let b = rt.intern("b");
        rt.non_local_exit_signal(a, NIL);
        rt.non_local_exit_signal(b, NIL);
        assert_eq!(rt.non_local_exit_get(), (ExitKind::Signal, a, NIL));
        rt.non_local_exit_clear();
        assert_eq!(rt.non_local_exit_check(), ExitKind::Return);
    }

    #[test]
    fn test_type_of_values() {
        let rt = Loopback::new();
        let cases = [
            (rt.make_int(1), "integer"),
            (rt.make_float(1.5), "float"),
            (rt.make_str("s"), "string"),
            (rt.intern("sym"), "symbol"),
            (rt.make_list(&[T]), "cons"),
        ];
        for (value, expected) in cases {
            let ty = rt.type_of(value);
            assert_eq!(rt.symbol_name(ty).as_deref(), Some(expected));
        }
    }

    #[test]
    fn test_pipe_round_trip() {
        let rt = Loopback::new();
        let identity = rt.intern("identity");
        let mut writer = rt.open_channel(identity).unwrap();
        writer.write_all(b"1\n").unwrap();
        assert_eq!(rt.pending_bytes(), 2);

        let report = rt.pump();
        assert_eq!(report.chunks, 1);
        assert!(report.exits.is_empty());
        assert_eq!(rt.pending_bytes(), 0);

        rt.close_pipes();
        assert!(writer.write_all(b"2\n").is_err());
    }

    #[test]
    fn test_open_channel_requires_function() {
        let rt = Loopback::new();
        assert!(rt.open_channel(rt.make_int(3)).is_err());
    }
}
