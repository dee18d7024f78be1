use crate::types::PrimitiveType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstOp {
    None,
    Binary(BinaryOp),
    IntLit,
    Ident,
    LvIdent,
    Assign,
    Print,
    Glue,
    If,
    While,
    Function,
    Widen,
    Return,
    Call,
    Deref,
    AddrOf,
    Scale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstKind {
    Binary {
        op: BinaryOp,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    IntLit(i64),
    Ident(String),
    LvIdent(String),
    /// `source` is evaluated first and stored into `dest`.
    Assign {
        source: Box<Ast>,
        dest: Box<Ast>,
    },
    Print(Box<Ast>),
    Glue {
        left: Box<Ast>,
        right: Box<Ast>,
    },
    If {
        cond: Box<Ast>,
        then: Option<Box<Ast>>,
        otherwise: Option<Box<Ast>>,
    },
    While {
        cond: Box<Ast>,
        body: Option<Box<Ast>>,
    },
    Function {
        name: String,
        body: Option<Box<Ast>>,
    },
    Widen(Box<Ast>),
    Return(Box<Ast>),
    Call {
        name: String,
        arg: Box<Ast>,
    },
    Deref(Box<Ast>),
    AddrOf(String),
    Scale {
        value: Box<Ast>,
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub kind: AstKind,
    pub ty: PrimitiveType,
    /* value rather than address */
    pub rval: bool,
}

impl Ast {
    pub fn new(kind: AstKind, ty: PrimitiveType) -> Ast {
        Ast {
            kind,
            ty,
            rval: false,
        }
    }

    pub fn statement(kind: AstKind) -> Ast {
        Ast::new(kind, PrimitiveType::None)
    }

    pub fn int_lit(value: i64) -> Ast {
        let ty = if (0..256).contains(&value) {
            PrimitiveType::Char
        } else {
            PrimitiveType::Int
        };
        Ast::new(AstKind::IntLit(value), ty)
    }

    pub fn binary(op: BinaryOp, left: Ast, right: Ast, ty: PrimitiveType) -> Ast {
        Ast::new(
            AstKind::Binary {
                op,
                left: left.into(),
                right: right.into(),
            },
            ty,
        )
    }

    pub fn glue(left: Option<Ast>, right: Option<Ast>) -> Option<Ast> {
        match (left, right) {
            (Some(left), Some(right)) => Some(Ast::statement(AstKind::Glue {
                left: left.into(),
                right: right.into(),
            })),
            (left, None) => left,
            (None, right) => right,
        }
    }

    pub fn op(&self) -> AstOp {
        match &self.kind {
            AstKind::Binary { op, .. } => AstOp::Binary(*op),
            AstKind::IntLit(_) => AstOp::IntLit,
            AstKind::Ident(_) => AstOp::Ident,
            AstKind::LvIdent(_) => AstOp::LvIdent,
            AstKind::Assign { .. } => AstOp::Assign,
            AstKind::Print(_) => AstOp::Print,
            AstKind::Glue { .. } => AstOp::Glue,
            AstKind::If { .. } => AstOp::If,
            AstKind::While { .. } => AstOp::While,
            AstKind::Function { .. } => AstOp::Function,
            AstKind::Widen(_) => AstOp::Widen,
            AstKind::Return(_) => AstOp::Return,
            AstKind::Call { .. } => AstOp::Call,
            AstKind::Deref(_) => AstOp::Deref,
            AstKind::AddrOf(_) => AstOp::AddrOf,
            AstKind::Scale { .. } => AstOp::Scale,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self.op(), AstOp::Binary(op) if op.is_comparison())
    }

    pub fn last_statement(&self) -> &Ast {
        match &self.kind {
            AstKind::Glue { right, .. } => right.last_statement(),
            _ => self,
        }
    }

    pub fn needs_semicolon(&self) -> bool {
        !matches!(
            self.op(),
            AstOp::Glue | AstOp::If | AstOp::While | AstOp::Function
        )
    }
}
