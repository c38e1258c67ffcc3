//! Defines a global symbol type and its associated interning pool
use std::sync::{Mutex, OnceLock};
use string_interner::{
    backend::BucketBackend, symbol::SymbolU32, StringInterner,
};

/// A globally interned symbol.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GSym(SymbolU32);

type Pool = StringInterner<BucketBackend>;

fn singleton() -> &'static Mutex<Pool> {
    static SINGLETON: OnceLock<Mutex<Pool>> = OnceLock::new();
    SINGLETON.get_or_init(|| Mutex::new(Pool::new()))
}

impl GSym {
    /// Intern a string into the global symbol table.
    pub fn new(s: impl AsRef<str>) -> Self {
        s.as_ref().into()
    }

    /// Convert this symbol into the string in the static, global symbol table.
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

impl From<&str> for GSym {
    fn from(s: &str) -> Self {
        GSym(singleton().lock().unwrap().get_or_intern(s))
    }
}

impl From<String> for GSym {
    fn from(s: String) -> Self {
        GSym(singleton().lock().unwrap().get_or_intern(&s))
    }
}

impl From<&String> for GSym {
    fn from(s: &String) -> Self {
        GSym(singleton().lock().unwrap().get_or_intern(s))
    }
}

impl From<GSym> for &'static str {
    fn from(sym: GSym) -> Self {
        let pool = singleton().lock().unwrap();
        let s = pool.resolve(sym.0).expect("symbol not in global pool");
        // SAFETY: the bucket backend never moves or frees interned strings
        // and the pool itself is never dropped, so the reference is stable
        // for the lifetime of the program.
        unsafe { std::mem::transmute::<&str, &'static str>(s) }
    }
}

impl std::fmt::Debug for GSym {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.as_str(), f)
    }
}

impl std::fmt::Display for GSym {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self.as_str(), f)
    }
}
