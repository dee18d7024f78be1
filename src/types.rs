use std::fmt;

use snafu::ensure;

use crate::error::{
    CompileResult, IncompatibleTypesSnafu, NoPointerTypeSnafu, NotAPointerSnafu,
};
use crate::parser::ast::BinaryOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveType {
    None,
    Void,
    Char,
    Int,
    Long,
    VoidPtr,
    CharPtr,
    IntPtr,
    LongPtr,
}

impl PrimitiveType {
    pub fn size(self) -> usize {
        match self {
            PrimitiveType::None | PrimitiveType::Void => 0,
            PrimitiveType::Char => 1,
            PrimitiveType::Int => 4,
            PrimitiveType::Long => 8,
            PrimitiveType::VoidPtr
            | PrimitiveType::CharPtr
            | PrimitiveType::IntPtr
            | PrimitiveType::LongPtr => 8,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(
            self,
            PrimitiveType::Char | PrimitiveType::Int | PrimitiveType::Long
        )
    }

    pub fn is_ptr(self) -> bool {
        matches!(
            self,
            PrimitiveType::VoidPtr
                | PrimitiveType::CharPtr
                | PrimitiveType::IntPtr
                | PrimitiveType::LongPtr
        )
    }

    pub fn pointer_to(self) -> CompileResult<PrimitiveType> {
        match self {
            PrimitiveType::Void => Ok(PrimitiveType::VoidPtr),
            PrimitiveType::Char => Ok(PrimitiveType::CharPtr),
            PrimitiveType::Int => Ok(PrimitiveType::IntPtr),
            PrimitiveType::Long => Ok(PrimitiveType::LongPtr),
            ty => NoPointerTypeSnafu { ty }.fail(),
        }
    }

    pub fn value_at(self) -> CompileResult<PrimitiveType> {
        match self {
            PrimitiveType::VoidPtr => Ok(PrimitiveType::Void),
            PrimitiveType::CharPtr => Ok(PrimitiveType::Char),
            PrimitiveType::IntPtr => Ok(PrimitiveType::Int),
            PrimitiveType::LongPtr => Ok(PrimitiveType::Long),
            ty => NotAPointerSnafu { ty }.fail(),
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::None => "none",
            PrimitiveType::Void => "void",
            PrimitiveType::Char => "char",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::VoidPtr => "void *",
            PrimitiveType::CharPtr => "char *",
            PrimitiveType::IntPtr => "int *",
            PrimitiveType::LongPtr => "long *",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Keep,
    WidenLeft(PrimitiveType),
    WidenRight(PrimitiveType),
}

/// Integer compatibility of `left` and `right`.
///
/// With `right_only` set the left type is authoritative (the destination of
/// an assignment): only the right side may grow, and a right side that is
/// wider than the left is rejected instead of truncated.
pub fn coerce(
    left: PrimitiveType,
    right: PrimitiveType,
    right_only: bool,
) -> CompileResult<Coercion> {
    ensure!(
        left.is_int() && right.is_int(),
        IncompatibleTypesSnafu { left, right }
    );

    let (lsize, rsize) = (left.size(), right.size());

    if lsize == rsize {
        Ok(Coercion::Keep)
    } else if lsize < rsize {
        ensure!(!right_only, IncompatibleTypesSnafu { left, right });
        Ok(Coercion::WidenLeft(right))
    } else {
        Ok(Coercion::WidenRight(left))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Keep,
    Widen(PrimitiveType),
    /// Multiply by the pointee size; the result is typed as the pointer.
    Scale {
        ty: PrimitiveType,
        size: usize,
    },
}

/// Decides how a value of type `from` can be used against `to` under `op`.
///
/// `op` is `None` for plain conversions (assignment, return). Returns `None`
/// when the two types cannot be reconciled from this side.
pub fn modify_type(
    from: PrimitiveType,
    to: PrimitiveType,
    op: Option<BinaryOp>,
) -> Option<Conversion> {
    if from.is_int() && to.is_int() {
        return match coerce(to, from, true) {
            Ok(Coercion::WidenRight(ty)) => Some(Conversion::Widen(ty)),
            Ok(_) => Some(Conversion::Keep),
            Err(_) => None,
        };
    }

    if from.is_ptr() && from == to && op.map_or(true, BinaryOp::is_comparison) {
        return Some(Conversion::Keep);
    }

    if matches!(op, Some(BinaryOp::Add | BinaryOp::Sub)) && from.is_int() && to.is_ptr() {
        let size = to.value_at().ok()?.size();
        if size > 0 {
            return Some(Conversion::Scale { ty: to, size });
        }
    }

    None
}
