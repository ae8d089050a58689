//! Recursive-descent parser from the token stream to the statement tree.
//!
//! Class declarations are resolved at parse time: every `class` registers its
//! (initially empty) class object in a table before the body is read, so a
//! constructor call binds directly to the class object even when a method
//! constructs instances of the class it belongs to. A parent class must
//! already be declared, which keeps the inheritance chain acyclic by
//! construction.

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{anyhow, Result};

use crate::ast::{BinaryOp, Expression, Program, Statement, UnaryOp, VariablePath};
use crate::runtime::{Class, Method};
use crate::token::Token;

fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    classes: HashMap<String, Rc<Class>>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            classes: HashMap::new(),
        }
    }

    pub fn parse_program(mut self) -> Result<Program> {
        let mut statements = Vec::new();
        while !matches!(self.current(), Token::Eof) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current() {
            Token::Class => self.parse_class_definition(),
            Token::If => self.parse_if(),
            Token::Return => self.parse_return(),
            Token::Print => self.parse_print(),
            _ => self.parse_simple_statement(),
        }
    }

    fn parse_class_definition(&mut self) -> Result<Statement> {
        self.expect(&Token::Class, "'class'")?;
        let name = self.expect_id()?;
        let parent = if matches!(self.current(), Token::Char('(')) {
            self.advance();
            let parent_name = self.expect_id()?;
            self.expect_char(')')?;
            let parent = self.classes.get(&parent_name).cloned().ok_or_else(|| {
                anyhow!("Base class '{parent_name}' of '{name}' is not defined")
            })?;
            Some(parent)
        } else {
            None
        };
        self.expect_char(':')?;
        self.expect(&Token::Newline, "newline")?;
        self.expect(&Token::Indent, "indent")?;

        // Registered before the body so the methods can refer back to it.
        let class = Rc::new(Class::new(name.clone(), Vec::new(), parent));
        self.classes.insert(name, class.clone());

        while !matches!(self.current(), Token::Dedent | Token::Eof) {
            if self.consume_newlines() {
                continue;
            }
            let method = self.parse_method()?;
            class.add_method(method);
        }
        self.expect(&Token::Dedent, "dedent")?;

        Ok(Statement::ClassDefinition(class))
    }

    fn parse_method(&mut self) -> Result<Method> {
        self.expect(&Token::Def, "'def'")?;
        let name = self.expect_id()?;
        self.expect_char('(')?;
        let mut formal_params = Vec::new();
        if !matches!(self.current(), Token::Char(')')) {
            formal_params.push(self.expect_id()?);
            while matches!(self.current(), Token::Char(',')) {
                self.advance();
                formal_params.push(self.expect_id()?);
            }
        }
        self.expect_char(')')?;
        self.expect_char(':')?;
        let body = self.parse_suite()?;
        Ok(Method {
            name,
            formal_params,
            body,
        })
    }

    fn parse_suite(&mut self) -> Result<Vec<Statement>> {
        self.expect(&Token::Newline, "newline")?;
        self.expect(&Token::Indent, "indent")?;
        let mut body = Vec::new();
        while !matches!(self.current(), Token::Dedent | Token::Eof) {
            if self.consume_newlines() {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        self.expect(&Token::Dedent, "dedent")?;
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Statement> {
        self.expect(&Token::If, "'if'")?;
        let condition = self.parse_expression()?;
        self.expect_char(':')?;
        let then_body = self.parse_suite()?;
        let else_body = if matches!(self.current(), Token::Else) {
            self.advance();
            self.expect_char(':')?;
            Some(self.parse_suite()?)
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_return(&mut self) -> Result<Statement> {
        self.expect(&Token::Return, "'return'")?;
        if matches!(self.current(), Token::Newline) {
            self.advance();
            return Ok(Statement::Return(None));
        }
        let value = self.parse_expression()?;
        self.expect(&Token::Newline, "newline")?;
        Ok(Statement::Return(Some(value)))
    }

    fn parse_print(&mut self) -> Result<Statement> {
        self.expect(&Token::Print, "'print'")?;
        let mut args = Vec::new();
        if !matches!(self.current(), Token::Newline) {
            args.push(self.parse_expression()?);
            while matches!(self.current(), Token::Char(',')) {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }
        self.expect(&Token::Newline, "newline")?;
        Ok(Statement::Print(args))
    }

    fn parse_simple_statement(&mut self) -> Result<Statement> {
        let expression = self.parse_expression()?;
        if matches!(self.current(), Token::Char('=')) {
            let Expression::Variable(path) = expression else {
                return Err(self.error("assignable name on the left of '='"));
            };
            self.advance();
            let rv = self.parse_expression()?;
            self.expect(&Token::Newline, "newline")?;
            let statement = match path.tail.split_last() {
                None => Statement::Assignment { var: path.name, rv },
                Some((field, object_tail)) => Statement::FieldAssignment {
                    object: VariablePath {
                        name: path.name,
                        tail: object_tail.to_vec(),
                    },
                    field: field.clone(),
                    rv,
                },
            };
            return Ok(statement);
        }
        self.expect(&Token::Newline, "newline")?;
        Ok(Statement::Expression(expression))
    }

    fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut expression = self.parse_and()?;
        while matches!(self.current(), Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            expression = binary(BinaryOp::Or, expression, rhs);
        }
        Ok(expression)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut expression = self.parse_not_expr()?;
        while matches!(self.current(), Token::And) {
            self.advance();
            let rhs = self.parse_not_expr()?;
            expression = binary(BinaryOp::And, expression, rhs);
        }
        Ok(expression)
    }

    fn parse_not_expr(&mut self) -> Result<Expression> {
        if matches!(self.current(), Token::Not) {
            self.advance();
            let operand = self.parse_not_expr()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    // A single optional comparison; chains like a < b < c are rejected by the
    // caller expecting a newline.
    fn parse_comparison(&mut self) -> Result<Expression> {
        let lhs = self.parse_additive()?;
        let op = match self.current() {
            Token::Eq => BinaryOp::Eq,
            Token::NotEq => BinaryOp::NotEq,
            Token::LessOrEq => BinaryOp::LessOrEq,
            Token::GreaterOrEq => BinaryOp::GreaterOrEq,
            Token::Char('<') => BinaryOp::Less,
            Token::Char('>') => BinaryOp::Greater,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(binary(op, lhs, rhs))
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut expression = self.parse_term()?;
        loop {
            let op = match self.current() {
                Token::Char('+') => BinaryOp::Add,
                Token::Char('-') => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            expression = binary(op, expression, rhs);
        }
        Ok(expression)
    }

    fn parse_term(&mut self) -> Result<Expression> {
        let mut expression = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Char('*') => BinaryOp::Mult,
                Token::Char('/') => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            expression = binary(op, expression, rhs);
        }
        Ok(expression)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        if matches!(self.current(), Token::Char('-')) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let expression = match self.current() {
            Token::Number(value) => {
                let value = *value;
                self.advance();
                Expression::Number(value)
            }
            Token::String(value) => {
                let value = value.clone();
                self.advance();
                Expression::String(value)
            }
            Token::True => {
                self.advance();
                Expression::Bool(true)
            }
            Token::False => {
                self.advance();
                Expression::Bool(false)
            }
            Token::None => {
                self.advance();
                Expression::None
            }
            Token::Char('(') => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_char(')')?;
                inner
            }
            Token::Id(_) => self.parse_name_expression()?,
            _ => return Err(self.error("expression")),
        };
        self.parse_postfix(expression)
    }

    fn parse_name_expression(&mut self) -> Result<Expression> {
        let name = self.expect_id()?;
        let mut tail = Vec::new();
        while matches!(self.current(), Token::Char('.')) {
            self.advance();
            tail.push(self.expect_id()?);
        }

        if !matches!(self.current(), Token::Char('(')) {
            return Ok(Expression::Variable(VariablePath { name, tail }));
        }

        if tail.is_empty() && name == "str" && !self.classes.contains_key("str") {
            self.expect_char('(')?;
            let argument = self.parse_expression()?;
            self.expect_char(')')?;
            return Ok(Expression::Stringify(Box::new(argument)));
        }

        let args = self.parse_arguments()?;
        match tail.split_last() {
            None => {
                let class = self
                    .classes
                    .get(&name)
                    .ok_or_else(|| anyhow!("Unknown class '{name}' in constructor call"))?;
                Ok(Expression::NewInstance {
                    class: Rc::downgrade(class),
                    args,
                })
            }
            Some((method, object_tail)) => Ok(Expression::MethodCall {
                object: Box::new(Expression::Variable(VariablePath {
                    name,
                    tail: object_tail.to_vec(),
                })),
                method: method.clone(),
                args,
            }),
        }
    }

    // Method calls chain on call results: F().calc(4).
    fn parse_postfix(&mut self, mut expression: Expression) -> Result<Expression> {
        while matches!(self.current(), Token::Char('.')) {
            self.advance();
            let method = self.expect_id()?;
            let args = self.parse_arguments()?;
            expression = Expression::MethodCall {
                object: Box::new(expression),
                method,
                args,
            };
        }
        Ok(expression)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>> {
        self.expect_char('(')?;
        let mut args = Vec::new();
        if !matches!(self.current(), Token::Char(')')) {
            args.push(self.parse_expression()?);
            while matches!(self.current(), Token::Char(',')) {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }
        self.expect_char(')')?;
        Ok(args)
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while matches!(self.current(), Token::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: &Token, description: &str) -> Result<()> {
        if self.current() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(description))
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<()> {
        self.expect(&Token::Char(expected), &format!("'{expected}'"))
    }

    fn expect_id(&mut self) -> Result<String> {
        if let Token::Id(name) = self.current() {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("identifier"))
        }
    }

    fn error(&self, expected: &str) -> anyhow::Error {
        anyhow!(
            "Expected {expected}, got {:?} at token {}",
            self.current(),
            self.pos
        )
    }
}

pub fn parse_tokens(tokens: Vec<Token>) -> Result<Program> {
    Parser::new(tokens).parse_program()
}
