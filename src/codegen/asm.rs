use std::fmt;

use crate::error::{CompileError, CompileResult, InvalidOperationSnafu, UnsizedTypeSnafu};
use crate::parser::ast::BinaryOp;
use crate::types::PrimitiveType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub usize);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmType {
    Byte,
    Longword,
    Quadword,
}

impl AsmType {
    pub fn size(self) -> usize {
        match self {
            AsmType::Byte => 1,
            AsmType::Longword => 4,
            AsmType::Quadword => 8,
        }
    }
}

impl TryFrom<PrimitiveType> for AsmType {
    type Error = CompileError;

    fn try_from(ty: PrimitiveType) -> CompileResult<AsmType> {
        match ty.size() {
            1 => Ok(AsmType::Byte),
            4 => Ok(AsmType::Longword),
            8 => Ok(AsmType::Quadword),
            _ => UnsizedTypeSnafu { ty }.fail(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsmRegister {
    Ax,
    Dx,
    Di,
    Si,
    Sp,
    Bp,
    R8,
    R9,
    R10,
    R11,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmOperand {
    Imm(i64),
    Register(AsmRegister),
    /* rip-relative global */
    Data(String),
    /* (reg) */
    Memory(AsmRegister),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmBinaryOp {
    Add,
    Sub,
    Mul,
    Shl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionCode {
    E,
    NE,
    L,
    G,
    LE,
    GE,
}

impl ConditionCode {
    pub fn inverse(self) -> ConditionCode {
        match self {
            ConditionCode::E => ConditionCode::NE,
            ConditionCode::NE => ConditionCode::E,
            ConditionCode::L => ConditionCode::GE,
            ConditionCode::G => ConditionCode::LE,
            ConditionCode::LE => ConditionCode::G,
            ConditionCode::GE => ConditionCode::L,
        }
    }
}

impl TryFrom<BinaryOp> for ConditionCode {
    type Error = CompileError;

    fn try_from(op: BinaryOp) -> CompileResult<ConditionCode> {
        match op {
            BinaryOp::Eq => Ok(ConditionCode::E),
            BinaryOp::Ne => Ok(ConditionCode::NE),
            BinaryOp::Lt => Ok(ConditionCode::L),
            BinaryOp::Gt => Ok(ConditionCode::G),
            BinaryOp::Le => Ok(ConditionCode::LE),
            BinaryOp::Ge => Ok(ConditionCode::GE),
            op => InvalidOperationSnafu {
                op: format!("{:?}", op),
            }
            .fail(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Text,
    Data,
    Rodata,
    NoteGnuStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmInstruction {
    Section(Section),
    Globl(String),
    FunctionType(String),
    Symbol(String),
    Label(Label),
    Zero(AsmType),
    String(String),

    Mov {
        asm_type: AsmType,
        src: AsmOperand,
        dst: AsmOperand,
    },
    Movsx {
        src_type: AsmType,
        src: AsmOperand,
        dst_type: AsmType,
        dst: AsmOperand,
    },
    MovZeroExtend {
        src_type: AsmType,
        src: AsmOperand,
        dst_type: AsmType,
        dst: AsmOperand,
    },
    Lea {
        src: AsmOperand,
        dst: AsmOperand,
    },
    /* Two-operand AT&T form: `rhs = rhs op lhs`. */
    Binary {
        op: AsmBinaryOp,
        lhs: AsmOperand,
        rhs: AsmOperand,
    },
    Cqo,
    Idiv(AsmOperand),
    /* Sets flags from `rhs - lhs`. */
    Cmp {
        lhs: AsmOperand,
        rhs: AsmOperand,
    },
    SetCC {
        condition: ConditionCode,
        operand: AsmOperand,
    },
    Jmp(Label),
    JmpCC {
        condition: ConditionCode,
        target: Label,
    },
    Push(AsmOperand),
    Pop(AsmOperand),
    Call(String),
    Ret,
}
