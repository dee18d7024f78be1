use anyhow::{bail, ensure, Context, Result};

use crate::{
    codegen::gen::{CodeGen, FunctionContext},
    emitter::AsmSink,
    error::{
        CompileError, CompileResult, IncompatibleTypesSnafu, NotAComparisonSnafu, SemanticSnafu,
        UnexpectedTokenSnafu,
    },
    lexer::{Lexer, Token, TokenKind},
    parser::ast::{Ast, AstKind, AstOp, BinaryOp},
    types::{modify_type, Conversion, PrimitiveType},
};

fn semantic(message: impl Into<String>) -> CompileError {
    SemanticSnafu {
        message: message.into(),
    }
    .build()
}

fn unexpected(expected: &str, found: &Token) -> CompileError {
    UnexpectedTokenSnafu {
        expected,
        found: found.to_string(),
    }
    .build()
}

fn precedence(kind: TokenKind) -> Option<u8> {
    match kind {
        TokenKind::Assign => Some(1),
        TokenKind::Plus | TokenKind::Minus => Some(10),
        TokenKind::Star | TokenKind::Slash => Some(20),
        TokenKind::Eq | TokenKind::Ne => Some(30),
        TokenKind::Lt | TokenKind::Gt | TokenKind::Le | TokenKind::Ge => Some(40),
        _ => None,
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::Ne => BinaryOp::Ne,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Ge => BinaryOp::Ge,
        _ => return None,
    };
    Some(op)
}

fn convert(node: Ast, conversion: Conversion) -> Ast {
    match conversion {
        Conversion::Keep => node,
        Conversion::Widen(ty) => Ast::new(AstKind::Widen(node.into()), ty),
        Conversion::Scale { ty, size } => Ast::new(
            AstKind::Scale {
                value: node.into(),
                size,
            },
            ty,
        ),
    }
}

pub struct Parser<S: AsmSink> {
    lexer: Lexer,
    codegen: CodeGen<S>,
    current_fn: Option<FunctionContext>,
    dump_ast: bool,
}

impl<S: AsmSink> Parser<S> {
    pub fn new(lexer: Lexer, codegen: CodeGen<S>) -> Parser<S> {
        Parser {
            lexer,
            codegen,
            current_fn: None,
            dump_ast: false,
        }
    }

    pub fn dump_ast(mut self, dump_ast: bool) -> Parser<S> {
        self.dump_ast = dump_ast;
        self
    }

    pub fn into_codegen(self) -> CodeGen<S> {
        self.codegen
    }

    fn advance(&mut self) -> CompileResult<Token> {
        self.lexer.next_token()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.lexer.current().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> CompileResult<Token> {
        self.lexer.eat(kind)
    }

    fn is_next(&mut self, kind: TokenKind) -> CompileResult<bool> {
        if self.check(kind) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn ident(&mut self) -> CompileResult<String> {
        Ok(self.eat(TokenKind::Ident)?.lexeme)
    }

    pub fn parse_decls(&mut self) -> Result<()> {
        self.advance()
            .with_context(|| format!("line {}", self.lexer.line()))?;

        while !self.check(TokenKind::Eof) {
            self.parse_decl()
                .with_context(|| format!("line {}", self.lexer.line()))?;
        }

        Ok(())
    }

    fn parse_decl(&mut self) -> Result<()> {
        let ty = self.parse_type()?;
        let name = self.ident()?;

        if self.check(TokenKind::LParen) {
            self.parse_function(name, ty)
        } else {
            self.parse_var_list(name, ty)
        }
    }

    fn parse_type(&mut self) -> Result<PrimitiveType> {
        let mut ty = match self.lexer.current().kind {
            TokenKind::Void => PrimitiveType::Void,
            TokenKind::Char => PrimitiveType::Char,
            TokenKind::Int => PrimitiveType::Int,
            TokenKind::Long => PrimitiveType::Long,
            _ => bail!(unexpected("type", self.lexer.current())),
        };
        self.advance()?;

        while self.is_next(TokenKind::Star)? {
            ty = ty.pointer_to()?;
        }

        Ok(ty)
    }

    // name (, name)* ; with the first name already read
    fn parse_var_list(&mut self, first: String, ty: PrimitiveType) -> Result<()> {
        let mut name = first;

        loop {
            self.codegen.declare_global(&name, ty)?;
            if !self.is_next(TokenKind::Comma)? {
                break;
            }
            name = self.ident()?;
        }

        self.eat(TokenKind::Semi)?;
        Ok(())
    }

    fn parse_function(&mut self, name: String, ty: PrimitiveType) -> Result<()> {
        let func = self.codegen.declare_function(&name, ty)?;

        self.eat(TokenKind::LParen)?;
        self.is_next(TokenKind::Void)?;
        self.eat(TokenKind::RParen)?;

        self.current_fn = Some(func.clone());
        let body = self.parse_compound()?;
        self.current_fn = None;

        if ty != PrimitiveType::Void {
            let returns = body
                .as_ref()
                .map_or(false, |body| body.last_statement().op() == AstOp::Return);
            ensure!(
                returns,
                semantic(format!("non-void function '{}' must end with return", name))
            );
        }

        let tree = Ast::statement(AstKind::Function {
            name,
            body: body.map(Box::new),
        });

        if self.dump_ast {
            println!("{:#?}", tree);
        }

        self.codegen.gen_function(&func, &tree)
    }

    fn parse_compound(&mut self) -> Result<Option<Ast>> {
        self.eat(TokenKind::LBrace)?;

        let mut tree = None;
        while !self.is_next(TokenKind::RBrace)? {
            let stmt = self.parse_statement()?;
            tree = Ast::glue(tree, stmt);
        }

        Ok(tree)
    }

    fn parse_statement(&mut self) -> Result<Option<Ast>> {
        if self.check(TokenKind::LBrace) {
            return self.parse_compound();
        }

        let stmt = self.parse_single()?;
        if stmt.as_ref().map_or(false, Ast::needs_semicolon) {
            self.eat(TokenKind::Semi)?;
        }

        Ok(stmt)
    }

    fn parse_single(&mut self) -> Result<Option<Ast>> {
        match self.lexer.current().kind {
            kind if kind.is_type() => {
                let ty = self.parse_type()?;
                let name = self.ident()?;
                self.parse_var_list(name, ty)?;
                Ok(None)
            }
            TokenKind::If => self.parse_if().map(Some),
            TokenKind::While => self.parse_while().map(Some),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return().map(Some),
            TokenKind::Print => self.parse_print().map(Some),
            TokenKind::Semi => {
                self.advance()?;
                Ok(None)
            }
            _ => self.binexpr(0).map(Some),
        }
    }

    fn parse_condition(&mut self) -> Result<Ast> {
        self.eat(TokenKind::LParen)?;
        let cond = self.parse_comparison()?;
        self.eat(TokenKind::RParen)?;
        Ok(cond)
    }

    fn parse_comparison(&mut self) -> Result<Ast> {
        let cond = self.binexpr(0)?;
        ensure!(
            cond.is_comparison(),
            NotAComparisonSnafu {
                found: format!("{:?}", cond.op()),
            }
            .build()
        );
        Ok(cond)
    }

    fn parse_if(&mut self) -> Result<Ast> {
        self.eat(TokenKind::If)?;
        let cond = self.parse_condition()?;
        let then = self.parse_statement()?;

        let otherwise = if self.is_next(TokenKind::Else)? {
            self.parse_statement()?
        } else {
            None
        };

        Ok(Ast::statement(AstKind::If {
            cond: cond.into(),
            then: then.map(Box::new),
            otherwise: otherwise.map(Box::new),
        }))
    }

    fn parse_while(&mut self) -> Result<Ast> {
        self.eat(TokenKind::While)?;
        let cond = self.parse_condition()?;
        let body = self.parse_statement()?;

        Ok(Ast::statement(AstKind::While {
            cond: cond.into(),
            body: body.map(Box::new),
        }))
    }

    // for (pre; cond; post) body => pre; while (cond) { body; post; }
    fn parse_for(&mut self) -> Result<Option<Ast>> {
        self.eat(TokenKind::For)?;
        self.eat(TokenKind::LParen)?;

        let pre = self.parse_for_clause(TokenKind::Semi)?;
        let cond = self.parse_comparison()?;
        self.eat(TokenKind::Semi)?;
        let post = self.parse_for_clause(TokenKind::RParen)?;

        let body = self.parse_statement()?;

        let looped = Ast::statement(AstKind::While {
            cond: cond.into(),
            body: Ast::glue(body, post).map(Box::new),
        });

        Ok(Ast::glue(pre, Some(looped)))
    }

    fn parse_for_clause(&mut self, terminator: TokenKind) -> Result<Option<Ast>> {
        let clause = if self.check(terminator) {
            None
        } else {
            Some(self.binexpr(0)?)
        };
        self.eat(terminator)?;
        Ok(clause)
    }

    fn parse_return(&mut self) -> Result<Ast> {
        self.eat(TokenKind::Return)?;

        let Some(func) = self.current_fn.clone() else {
            bail!(semantic("'return' outside of a function"));
        };
        ensure!(
            func.ty != PrimitiveType::Void,
            semantic(format!("cannot return a value from void function '{}'", func.name))
        );

        let value = self.binexpr(0)?;
        let conversion = modify_type(value.ty, func.ty, None).ok_or_else(|| {
            IncompatibleTypesSnafu {
                left: func.ty,
                right: value.ty,
            }
            .build()
        })?;

        Ok(Ast::statement(AstKind::Return(
            convert(value, conversion).into(),
        )))
    }

    fn parse_print(&mut self) -> Result<Ast> {
        self.eat(TokenKind::Print)?;

        let value = self.binexpr(0)?;
        ensure!(
            value.ty.is_int() || value.ty.is_ptr(),
            semantic(format!("cannot print a value of type {}", value.ty))
        );

        Ok(Ast::statement(AstKind::Print(value.into())))
    }

    /// Precedence climbing; `ptp` is the precedence of the operator to the
    /// left. `=` is right associative.
    fn binexpr(&mut self, ptp: u8) -> Result<Ast> {
        let mut left = self.prefix()?;

        loop {
            let kind = self.lexer.current().kind;
            let Some(prec) = precedence(kind) else {
                break;
            };
            if prec < ptp || (prec == ptp && kind != TokenKind::Assign) {
                break;
            }

            self.advance()?;
            let right = self.binexpr(prec)?;
            left = self.combine(kind, left, right)?;
        }

        left.rval = true;
        Ok(left)
    }

    fn combine(&self, kind: TokenKind, mut left: Ast, mut right: Ast) -> Result<Ast> {
        if kind == TokenKind::Assign {
            return self.assignment(left, right);
        }

        let Some(op) = binary_op(kind) else {
            bail!(unexpected("binary operator", self.lexer.current()));
        };

        left.rval = true;
        right.rval = true;

        // A pointer can only be the left operand of '-'.
        ensure!(
            !(op == BinaryOp::Sub && left.ty.is_int() && right.ty.is_ptr()),
            IncompatibleTypesSnafu {
                left: left.ty,
                right: right.ty,
            }
            .build()
        );

        let left_plan = modify_type(left.ty, right.ty, Some(op));
        let right_plan = modify_type(right.ty, left.ty, Some(op));
        ensure!(
            left_plan.is_some() || right_plan.is_some(),
            IncompatibleTypesSnafu {
                left: left.ty,
                right: right.ty,
            }
            .build()
        );

        let left = match left_plan {
            Some(plan) => convert(left, plan),
            None => left,
        };
        let right = match right_plan {
            Some(plan) => convert(right, plan),
            None => right,
        };

        let ty = if op.is_comparison() {
            PrimitiveType::Int
        } else {
            left.ty
        };

        Ok(Ast::binary(op, left, right, ty))
    }

    fn assignment(&self, dest: Ast, mut source: Ast) -> Result<Ast> {
        source.rval = true;

        let ty = dest.ty;
        let dest = match dest.kind {
            AstKind::Ident(name) => Ast::new(AstKind::LvIdent(name), ty),
            kind @ AstKind::Deref(_) => Ast::new(kind, ty),
            _ => bail!(semantic(
                "the left side of '=' must be a variable or a dereference"
            )),
        };

        let conversion = modify_type(source.ty, ty, None).ok_or_else(|| {
            IncompatibleTypesSnafu {
                left: ty,
                right: source.ty,
            }
            .build()
        })?;

        Ok(Ast::new(
            AstKind::Assign {
                source: convert(source, conversion).into(),
                dest: dest.into(),
            },
            ty,
        ))
    }

    fn prefix(&mut self) -> Result<Ast> {
        match self.lexer.current().kind {
            TokenKind::Amper => {
                self.advance()?;
                let operand = self.prefix()?;
                let AstKind::Ident(name) = operand.kind else {
                    bail!(semantic("'&' must be applied to a variable"));
                };
                let ty = operand.ty.pointer_to()?;
                Ok(Ast::new(AstKind::AddrOf(name), ty))
            }
            TokenKind::Star => {
                self.advance()?;
                let operand = self.prefix()?;
                ensure!(
                    matches!(operand.op(), AstOp::Ident | AstOp::Deref),
                    semantic("'*' must be applied to a variable or a dereference")
                );
                let ty = operand.ty.value_at()?;
                ensure!(
                    ty != PrimitiveType::Void,
                    semantic("cannot dereference a void pointer")
                );
                Ok(Ast::new(AstKind::Deref(operand.into()), ty))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Ast> {
        let token = self.lexer.current().clone();

        match token.kind {
            TokenKind::IntLit => {
                self.advance()?;
                Ok(Ast::int_lit(token.as_int()))
            }
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.binexpr(0)?;
                self.eat(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident => {
                let peek = self.advance()?;
                if peek.kind == TokenKind::LParen {
                    return self.parse_call(token.lexeme);
                }
                self.lexer.reject(peek);

                let symbol = self.codegen.symbols().get(&token.lexeme)?;
                ensure!(
                    !symbol.is_function(),
                    semantic(format!("function '{}' used as a variable", symbol.name))
                );
                let node = Ast::new(AstKind::Ident(token.lexeme), symbol.ty);

                self.advance()?;
                Ok(node)
            }
            _ => bail!(unexpected("expression", &token)),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Ast> {
        let symbol = self.codegen.symbols().get(&name)?;
        ensure!(
            symbol.is_function(),
            semantic(format!("'{}' is not a function", name))
        );
        let ty = symbol.ty;

        self.eat(TokenKind::LParen)?;
        let arg = self.binexpr(0)?;
        ensure!(
            arg.ty.is_int() || arg.ty.is_ptr(),
            semantic(format!("cannot pass a value of type {} to '{}'", arg.ty, name))
        );
        self.eat(TokenKind::RParen)?;

        Ok(Ast::new(
            AstKind::Call {
                name,
                arg: arg.into(),
            },
            ty,
        ))
    }
}
