use super::{BinOp, Expr, ExprError};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    True,
    False,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Ident(name) => format!("identifier `{name}`"),
            Self::True => "`true`".to_string(),
            Self::False => "`false`".to_string(),
            Self::Plus => "`+`".to_string(),
            Self::Minus => "`-`".to_string(),
            Self::Star => "`*`".to_string(),
            Self::Slash => "`/`".to_string(),
            Self::Lt => "`<`".to_string(),
            Self::Le => "`<=`".to_string(),
            Self::Gt => "`>`".to_string(),
            Self::Ge => "`>=`".to_string(),
            Self::EqEq => "`==`".to_string(),
            Self::Ne => "`!=`".to_string(),
            Self::And => "`and`".to_string(),
            Self::Or => "`or`".to_string(),
            Self::Not => "`not`".to_string(),
            Self::LParen => "`(`".to_string(),
            Self::RParen => "`)`".to_string(),
        }
    }

    fn comparison(&self) -> Option<BinOp> {
        match self {
            Self::Lt => Some(BinOp::Lt),
            Self::Le => Some(BinOp::Le),
            Self::Gt => Some(BinOp::Gt),
            Self::Ge => Some(BinOp::Ge),
            Self::EqEq => Some(BinOp::Eq),
            Self::Ne => Some(BinOp::Ne),
            _ => None,
        }
    }
}

/// A token and the byte offset where it starts.
type Spanned = (Token, usize);

/// Deepest nesting of `(`, `not` and unary `-` accepted.
pub const MAX_DEPTH: usize = 64;

/// Most operators one expression may contain. Bounds the height of the tree
/// that evaluation walks recursively.
pub const MAX_OPERATORS: usize = 512;

fn error(offset: usize, message: impl Into<String>) -> ExprError {
    ExprError::Parse {
        offset,
        message: message.into(),
    }
}

fn tokenize(src: &str) -> Result<Vec<Spanned>, ExprError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                    i = j;
                }
            }
            let text = &src[start..i];
            let value: f64 = text
                .parse()
                .map_err(|_| error(start, format!("invalid number `{text}`")))?;
            tokens.push((Token::Number(value), start));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let word = &src[start..i];
            let token = match word.to_ascii_lowercase().as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "true" => Token::True,
                "false" => Token::False,
                _ => Token::Ident(word.to_string()),
            };
            tokens.push((token, start));
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let (token, width) = match (c, next) {
            (b'<', Some(b'=')) => (Token::Le, 2),
            (b'>', Some(b'=')) => (Token::Ge, 2),
            (b'=', Some(b'=')) => (Token::EqEq, 2),
            (b'!', Some(b'=')) => (Token::Ne, 2),
            (b'&', Some(b'&')) => (Token::And, 2),
            (b'|', Some(b'|')) => (Token::Or, 2),
            (b'<', _) => (Token::Lt, 1),
            (b'>', _) => (Token::Gt, 1),
            (b'!', _) => (Token::Not, 1),
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'*', _) => (Token::Star, 1),
            (b'/', _) => (Token::Slash, 1),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            (b'=', _) => return Err(error(start, "unexpected `=`, use `==` for equality")),
            _ => {
                let ch = src[start..].chars().next().unwrap_or('?');
                return Err(error(start, format!("unexpected character `{ch}`")));
            }
        };
        tokens.push((token, start));
        i += width;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn descend(&mut self, offset: usize) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(error(offset, "expression nested too deeply"));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn count_operator(&mut self, offset: usize) -> Result<(), ExprError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(error(offset, "expression has too many operators"));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, off)| *off)
    }

    fn bump(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.count_operator(self.offset())?;
            self.pos += 1;
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.count_operator(self.offset())?;
            self.pos += 1;
            let right = self.parse_not()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            let offset = self.offset();
            self.count_operator(offset)?;
            self.descend(offset)?;
            self.pos += 1;
            let inner = self.parse_not()?;
            self.ascend();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_additive()?;
        let Some(op) = self.peek().and_then(Token::comparison) else {
            return Ok(left);
        };
        self.count_operator(self.offset())?;
        self.pos += 1;
        let right = self.parse_additive()?;

        if self.peek().and_then(Token::comparison).is_some() {
            return Err(error(
                self.offset(),
                "chained comparisons are not supported, combine them with `and`",
            ));
        }
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.count_operator(self.offset())?;
            self.pos += 1;
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(left),
            };
            self.count_operator(self.offset())?;
            self.pos += 1;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Minus) {
            let offset = self.offset();
            self.count_operator(offset)?;
            self.descend(offset)?;
            self.pos += 1;
            let inner = self.parse_unary()?;
            self.ascend();
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let offset = self.offset();
        match self.bump() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::True, _)) => Ok(Expr::Bool(true)),
            Some((Token::False, _)) => Ok(Expr::Bool(false)),
            Some((Token::Ident(name), _)) => Ok(Expr::Var(name)),
            Some((Token::LParen, _)) => {
                self.descend(offset)?;
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(error(self.offset(), "expected `)`"));
                }
                self.ascend();
                Ok(inner)
            }
            Some((token, _)) => Err(error(
                offset,
                format!("expected a value, found {}", token.describe()),
            )),
            None => Err(error(offset, "unexpected end of expression")),
        }
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse rule expression text.
///
/// # Errors
///
/// Returns `ExprError::Parse` with the byte offset of the offending token.
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(error(0, "empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
        depth: 0,
        operators: 0,
    };
    let expr = parser.parse_or()?;

    if let Some((token, offset)) = parser.tokens.get(parser.pos) {
        return Err(error(
            *offset,
            format!("unexpected {} after expression", token.describe()),
        ));
    }
    Ok(expr)
}
