/// The type of an SSA value.
///
/// The clustering machinery never inspects types beyond equality and
/// copying them onto new function signatures, so the set of types is kept
/// small: the scalar types plus a shaped tensor type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    I32,
    I64,
    F32,
    F64,
    /// A tensor with an element type and a static shape.
    Tensor(Box<Type>, Vec<u64>),
}

impl Type {
    /// Shorthand for a tensor of `elem` with dimensions `dims`.
    pub fn tensor(elem: Type, dims: impl Into<Vec<u64>>) -> Self {
        Type::Tensor(Box::new(elem), dims.into())
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Tensor(elem, dims) => {
                write!(f, "tensor<")?;
                for d in dims {
                    write!(f, "{d}x")?;
                }
                write!(f, "{elem}>")
            }
        }
    }
}
