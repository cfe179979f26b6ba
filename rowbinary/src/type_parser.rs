use common::column::column::ColumnDescriptor;
use common::column::column_type::{DefaultKind, TypeCategory};
use common::err::client_error::ClientError;
use common::err::CResult;

use crate::registry;

/// 类型串解析。
///
/// 服务端 DESCRIBE/WithNamesAndTypes 返回的类型串是带括号嵌套的文法,
/// 如 `Array(Nullable(Decimal(9, 3)))`。词法切出标识符、括号、逗号、
/// 整数与单引号字符串, 之上做递归下降。

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    Quoted(String),
    LParen,
    RParen,
    Comma,
    Eq,
}

fn tokenize(input: &str) -> CResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            ' ' | '\t' => {
                pos += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                pos += 1;
            }
            '\'' => {
                pos += 1;
                let mut text = String::new();
                loop {
                    if pos >= chars.len() {
                        return Err(ClientError::SchemaParseError(format!(
                            "unterminated quoted literal in type '{}'",
                            input
                        )));
                    }
                    match chars[pos] {
                        '\\' if pos + 1 < chars.len() => {
                            text.push(chars[pos + 1]);
                            pos += 2;
                        }
                        '\'' => {
                            pos += 1;
                            break;
                        }
                        other => {
                            text.push(other);
                            pos += 1;
                        }
                    }
                }
                tokens.push(Token::Quoted(text));
            }
            '-' | '0'..='9' => {
                let start = pos;
                if c == '-' {
                    pos += 1;
                }
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let text: String = chars[start..pos].iter().collect();
                let number = text.parse::<i64>().map_err(|_| {
                    ClientError::SchemaParseError(format!("bad integer '{}' in type", text))
                })?;
                tokens.push(Token::Number(number));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = pos;
                while pos < chars.len()
                    && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_')
                {
                    pos += 1;
                }
                tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            }
            other => {
                return Err(ClientError::SchemaParseError(format!(
                    "unexpected character '{}' in type '{}'",
                    other, input
                )));
            }
        }
    }

    Ok(tokens)
}

/// 解析单个列类型串
pub fn parse_column_type(input: &str) -> CResult<ColumnDescriptor> {
    let tokens = tokenize(input)?;
    let mut parser = TypeParser { tokens, pos: 0 };
    let descriptor = parser.parse_type()?;
    if parser.pos != parser.tokens.len() {
        return Err(ClientError::SchemaParseError(format!(
            "trailing tokens after type '{}'",
            input
        )));
    }
    Ok(descriptor)
}

/// DESCRIBE 行的列解析: 名字 + 类型串 + default 种类
pub fn parse_column(name: &str, type_str: &str, default_kind: DefaultKind) -> CResult<ColumnDescriptor> {
    Ok(parse_column_type(type_str)?
        .with_name(name)
        .with_default_kind(default_kind))
}

struct TypeParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl TypeParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> CResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ClientError::SchemaParseError(String::from("unexpected end of type")))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> CResult<()> {
        let token = self.next()?;
        if token != expected {
            return Err(ClientError::SchemaParseError(format!(
                "expected {:?}, found {:?}",
                expected, token
            )));
        }
        Ok(())
    }

    fn expect_number(&mut self) -> CResult<i64> {
        match self.next()? {
            Token::Number(n) => Ok(n),
            other => Err(ClientError::SchemaParseError(format!(
                "expected integer, found {:?}",
                other
            ))),
        }
    }

    fn expect_quoted(&mut self) -> CResult<String> {
        match self.next()? {
            Token::Quoted(s) => Ok(s),
            other => Err(ClientError::SchemaParseError(format!(
                "expected quoted literal, found {:?}",
                other
            ))),
        }
    }

    fn expect_ident(&mut self) -> CResult<String> {
        match self.next()? {
            Token::Ident(s) => Ok(s),
            other => Err(ClientError::SchemaParseError(format!(
                "expected identifier, found {:?}",
                other
            ))),
        }
    }

    fn parse_type(&mut self) -> CResult<ColumnDescriptor> {
        let name = self.expect_ident()?;

        match name.as_str() {
            "Decimal" => {
                self.expect(Token::LParen)?;
                let precision = self.expect_number()?;
                self.expect(Token::Comma)?;
                let scale = self.expect_number()?;
                self.expect(Token::RParen)?;
                self.decimal(precision, scale)
            }
            "Decimal32" => self.decimal_shorthand(9, 32),
            "Decimal64" => self.decimal_shorthand(18, 64),
            "Decimal128" => self.decimal_shorthand(38, 128),
            "Decimal256" => self.decimal_shorthand(76, 256),
            "FixedString" => {
                self.expect(Token::LParen)?;
                let len = self.expect_number()?;
                self.expect(Token::RParen)?;
                if len < 1 {
                    return Err(ClientError::SchemaParseError(format!(
                        "FixedString length must be positive, got {}",
                        len
                    )));
                }
                Ok(ColumnDescriptor::new(TypeCategory::FixedString)
                    .with_fixed_length(len as usize))
            }
            "DateTime" => {
                let mut timezone = None;
                if self.peek() == Some(&Token::LParen) {
                    self.next()?;
                    timezone = Some(self.expect_quoted()?);
                    self.expect(Token::RParen)?;
                }
                Ok(ColumnDescriptor::new(TypeCategory::DateTime)
                    .with_width_bits(32)
                    .with_timezone(timezone))
            }
            "DateTime64" => {
                self.expect(Token::LParen)?;
                let scale = self.expect_number()?;
                if !(0..=9).contains(&scale) {
                    return Err(ClientError::SchemaParseError(format!(
                        "DateTime64 scale must be within [0, 9], got {}",
                        scale
                    )));
                }
                let mut timezone = None;
                if self.peek() == Some(&Token::Comma) {
                    self.next()?;
                    timezone = Some(self.expect_quoted()?);
                }
                self.expect(Token::RParen)?;
                Ok(ColumnDescriptor::new(TypeCategory::DateTime)
                    .with_width_bits(64)
                    .with_scale(scale as u32)
                    .with_timezone(timezone))
            }
            "Enum8" => self.parse_enum(8, i8::MIN as i64, i8::MAX as i64),
            "Enum16" => self.parse_enum(16, i16::MIN as i64, i16::MAX as i64),
            "Array" => {
                self.expect(Token::LParen)?;
                let inner = self.parse_type()?;
                self.expect(Token::RParen)?;
                Ok(ColumnDescriptor::new(TypeCategory::Array).with_children(vec![inner]))
            }
            "Tuple" => {
                self.expect(Token::LParen)?;
                let (children, names) = self.parse_element_list()?;
                self.expect(Token::RParen)?;
                let mut descriptor =
                    ColumnDescriptor::new(TypeCategory::Tuple).with_children(children);
                if !names.is_empty() {
                    descriptor = descriptor.with_child_names(names);
                }
                Ok(descriptor)
            }
            "Map" => {
                self.expect(Token::LParen)?;
                let key = self.parse_type()?;
                self.expect(Token::Comma)?;
                let value = self.parse_type()?;
                self.expect(Token::RParen)?;
                Ok(ColumnDescriptor::new(TypeCategory::Map).with_children(vec![key, value]))
            }
            "Nested" => {
                self.expect(Token::LParen)?;
                let (children, names) = self.parse_element_list()?;
                self.expect(Token::RParen)?;
                if names.len() != children.len() {
                    return Err(ClientError::SchemaParseError(String::from(
                        "Nested requires a name for every sub-column",
                    )));
                }
                // 线上形态是 Array(Tuple(...)); 子列名挂在 Tuple 上
                let tuple = ColumnDescriptor::new(TypeCategory::Tuple)
                    .with_children(children)
                    .with_child_names(names);
                Ok(ColumnDescriptor::new(TypeCategory::Nested).with_children(vec![tuple]))
            }
            "Nullable" => {
                self.expect(Token::LParen)?;
                let inner = self.parse_type()?;
                self.expect(Token::RParen)?;
                if inner.category().forbids_nullable_wrap() {
                    return Err(ClientError::IllegalNullable(format!(
                        "Nullable can not wrap {}",
                        inner
                    )));
                }
                Ok(ColumnDescriptor::new(TypeCategory::Nullable).with_children(vec![inner]))
            }
            "LowCardinality" => {
                self.expect(Token::LParen)?;
                let inner = self.parse_type()?;
                self.expect(Token::RParen)?;
                if !inner.category().allows_low_cardinality_wrap() {
                    return Err(ClientError::SchemaParseError(format!(
                        "LowCardinality can not wrap {}",
                        inner
                    )));
                }
                Ok(ColumnDescriptor::new(TypeCategory::LowCardinality).with_children(vec![inner]))
            }
            "AggregateFunction" => {
                self.expect(Token::LParen)?;
                let function = self.expect_ident()?;
                if function != "groupBitmap" {
                    return Err(ClientError::UnknownType(format!(
                        "unsupported aggregate function state '{}'",
                        function
                    )));
                }
                self.expect(Token::Comma)?;
                let inner = self.parse_type()?;
                self.expect(Token::RParen)?;
                Ok(ColumnDescriptor::new(TypeCategory::AggregateBitmap)
                    .with_children(vec![inner]))
            }
            _ => match registry::lookup(&name) {
                Some(simple) => Ok(simple.descriptor()),
                None => Err(ClientError::UnknownType(format!(
                    "unknown column type '{}'",
                    name
                ))),
            },
        }
    }

    fn decimal_shorthand(&mut self, precision: i64, width: u16) -> CResult<ColumnDescriptor> {
        self.expect(Token::LParen)?;
        let scale = self.expect_number()?;
        self.expect(Token::RParen)?;
        if !(0..=precision).contains(&scale) {
            return Err(ClientError::SchemaParseError(format!(
                "decimal scale {} out of range [0, {}]",
                scale, precision
            )));
        }
        Ok(ColumnDescriptor::new(TypeCategory::Decimal)
            .with_precision(precision as u32)
            .with_scale(scale as u32)
            .with_width_bits(width))
    }

    fn decimal(&mut self, precision: i64, scale: i64) -> CResult<ColumnDescriptor> {
        if !(1..=76).contains(&precision) {
            return Err(ClientError::SchemaParseError(format!(
                "decimal precision {} out of range [1, 76]",
                precision
            )));
        }
        if !(0..=precision).contains(&scale) {
            return Err(ClientError::SchemaParseError(format!(
                "decimal scale {} out of range [0, {}]",
                scale, precision
            )));
        }
        let width: u16 = match precision {
            1..=9 => 32,
            10..=18 => 64,
            19..=38 => 128,
            _ => 256,
        };
        Ok(ColumnDescriptor::new(TypeCategory::Decimal)
            .with_precision(precision as u32)
            .with_scale(scale as u32)
            .with_width_bits(width))
    }

    fn parse_enum(&mut self, width: u16, min: i64, max: i64) -> CResult<ColumnDescriptor> {
        self.expect(Token::LParen)?;
        let mut members = Vec::new();
        loop {
            let name = self.expect_quoted()?;
            self.expect(Token::Eq)?;
            let value = self.expect_number()?;
            if value < min || value > max {
                return Err(ClientError::SchemaParseError(format!(
                    "enum value {} out of range for Enum{}",
                    value, width
                )));
            }
            members.push((name, value as i32));
            match self.next()? {
                Token::Comma => continue,
                Token::RParen => break,
                other => {
                    return Err(ClientError::SchemaParseError(format!(
                        "expected ',' or ')' in enum, found {:?}",
                        other
                    )))
                }
            }
        }
        Ok(ColumnDescriptor::new(TypeCategory::Enum)
            .with_width_bits(width)
            .with_enum_members(members))
    }

    /// Tuple/Nested 的元素表, 元素可以带名字: `a Int32` 或裸类型 `Int32`
    fn parse_element_list(&mut self) -> CResult<(Vec<ColumnDescriptor>, Vec<String>)> {
        let mut children = Vec::new();
        let mut names = Vec::new();
        loop {
            let named = matches!(self.peek(), Some(Token::Ident(_)))
                && matches!(self.peek_at(1), Some(Token::Ident(_)));
            if named {
                names.push(self.expect_ident()?);
            }
            children.push(self.parse_type()?);

            match self.peek() {
                Some(Token::Comma) => {
                    self.next()?;
                }
                _ => break,
            }
        }
        if !names.is_empty() && names.len() != children.len() {
            return Err(ClientError::SchemaParseError(String::from(
                "mixed named and unnamed tuple elements",
            )));
        }
        Ok((children, names))
    }
}
