// Formula parser - converts expression text into an AST
// Supports: numbers, cell refs (A1), unary +/-, basic math (+, -, *, /), parentheses

use crate::position::Position;

/// Expression AST for the arithmetic formula language.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Cell reference. The position may lie outside the sheet bounds;
    /// evaluation turns such references into `#REF!`.
    Ref(Position),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }
}

/// Parse an expression (without any leading formula marker) into an AST.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty formula".to_string());
    }
    let (expr, pos) = parse_add_sub(&tokens, 0)?;
    if pos != tokens.len() {
        return Err(format!("unexpected {} after expression", tokens[pos].describe()));
    }
    Ok(expr)
}

#[derive(Debug, Clone)]
enum Token {
    Number(f64),
    CellRef(Position),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::CellRef(_) => "cell reference".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_ascii_whitespace() => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '*' => {
                tokens.push(Token::Star);
                chars.next();
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .ok()
                    .filter(|n: &f64| n.is_finite())
                    .ok_or_else(|| format!("invalid number: {}", num_str))?;
                tokens.push(Token::Number(num));
            }
            'A'..='Z' => {
                // Cell reference: letters followed by a 1-based row
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_uppercase() || ch.is_ascii_digit() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(cell_ref_token(&ident)?);
            }
            _ => return Err(format!("unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

/// Validate the [A-Z]+[1-9][0-9]* shape and convert to a position token.
///
/// A shape-valid reference whose coordinates overflow still tokenizes
/// (as `Position::NONE`); only malformed text is a syntax error.
fn cell_ref_token(ident: &str) -> Result<Token, String> {
    let letters = ident
        .bytes()
        .take_while(|b| b.is_ascii_uppercase())
        .count();
    let digits = &ident[letters..];

    if digits.is_empty()
        || digits.starts_with('0')
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(format!("invalid cell reference: {}", ident));
    }

    Ok(Token::CellRef(Position::parse(ident)))
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_unary(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_unary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let op = match tokens.get(pos) {
        Some(Token::Plus) => UnaryOp::Plus,
        Some(Token::Minus) => UnaryOp::Minus,
        _ => return parse_primary(tokens, pos),
    };
    let (operand, new_pos) = parse_unary(tokens, pos + 1)?;
    Ok((
        Expr::Unary {
            op,
            operand: Box::new(operand),
        },
        new_pos,
    ))
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    match tokens.get(pos) {
        None => Err("unexpected end of expression".to_string()),
        Some(Token::Number(n)) => Ok((Expr::Number(*n), pos + 1)),
        Some(Token::CellRef(p)) => Ok((Expr::Ref(*p), pos + 1)),
        Some(Token::LParen) => {
            let (inner, after) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(after) {
                Some(Token::RParen) => Ok((inner, after + 1)),
                _ => Err("expected ')'".to_string()),
            }
        }
        Some(other) => Err(format!("unexpected {}", other.describe())),
    }
}

// =========================================================================
// Canonical printing
// =========================================================================

impl Expr {
    /// Grammar level of this node: atoms bind tightest, +/- loosest.
    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(_) | Expr::Ref(_) => 4,
            Expr::Unary { .. } => 3,
            Expr::Binary { op: BinaryOp::Mul | BinaryOp::Div, .. } => 2,
            Expr::Binary { op: BinaryOp::Add | BinaryOp::Sub, .. } => 1,
        }
    }
}

fn write_child(
    f: &mut std::fmt::Formatter<'_>,
    child: &Expr,
    parens: bool,
) -> std::fmt::Result {
    if parens {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

impl std::fmt::Display for Expr {
    /// Canonical text form: parentheses appear exactly where the tree
    /// shape requires them. `a+(b+c)` and `a*(b*c)` print flat; `-`/`/`
    /// keep parentheses around same-level right operands.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Ref(p) => {
                if p.row < 0 || p.col < 0 {
                    // Reference whose text overflowed coordinate space.
                    write!(f, "#REF!")
                } else {
                    write!(f, "{}", p)
                }
            }
            Expr::Unary { op, operand } => {
                f.write_str(match op {
                    UnaryOp::Plus => "+",
                    UnaryOp::Minus => "-",
                })?;
                write_child(f, operand, operand.precedence() < self.precedence())
            }
            Expr::Binary { op, left, right } => {
                write_child(f, left, left.precedence() < self.precedence())?;
                write!(f, "{}", op.symbol())?;
                let right_parens = right.precedence() < self.precedence()
                    || (right.precedence() == self.precedence()
                        && matches!(op, BinaryOp::Sub | BinaryOp::Div));
                write_child(f, right, right_parens)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Expr {
        Expr::Number(n)
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse("42").unwrap(), num(42.0));
        assert_eq!(parse(" 3.5 ").unwrap(), num(3.5));
        assert_eq!(parse(".5").unwrap(), num(0.5));
    }

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse("B3").unwrap(), Expr::Ref(Position::new(2, 1)));
        assert_eq!(parse("AA17").unwrap(), Expr::Ref(Position::new(16, 26)));
    }

    #[test]
    fn test_precedence() {
        // 1+2*3 parses as 1+(2*3)
        let expr = parse("1+2*3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, left, right } => {
                assert_eq!(*left, num(1.0));
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_left_associativity() {
        // 1-2-3 parses as (1-2)-3
        let expr = parse("1-2-3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Sub, left, right } => {
                assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
                assert_eq!(*right, num(3.0));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_parens_override_precedence() {
        let expr = parse("(1+2)*3").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_unary_chain() {
        let expr = parse("--1").unwrap();
        match expr {
            Expr::Unary { op: UnaryOp::Minus, operand } => {
                assert!(matches!(*operand, Expr::Unary { op: UnaryOp::Minus, .. }));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_unary_binds_tighter_than_mul() {
        // -1*2 parses as (-1)*2
        let expr = parse("-1*2").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Mul, left, .. } => {
                assert!(matches!(*left, Expr::Unary { .. }));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_whitespace_ignored() {
        assert_eq!(parse("1 + 2").unwrap(), parse("1+2").unwrap());
        assert_eq!(parse("\tA1 *\n B2").unwrap(), parse("A1*B2").unwrap());
    }

    #[test]
    fn test_out_of_range_ref_tokenizes() {
        // Shape-valid but past the sheet edge: recorded, not rejected.
        let expr = parse("ZZZ9999").unwrap();
        match expr {
            Expr::Ref(p) => assert!(!p.is_valid()),
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
        assert!(parse("1+").is_err());
        assert!(parse("*1").is_err());
        assert!(parse("(1+2").is_err());
        assert!(parse("1+2)").is_err());
        assert!(parse("1 2").is_err());
        assert!(parse("a1").is_err());
        assert!(parse("A0").is_err());
        assert!(parse("A01").is_err());
        assert!(parse("AB").is_err());
        assert!(parse("1.2.3").is_err());
        assert!(parse("1&2").is_err());
        assert!(parse("()").is_err());
    }

    #[test]
    fn test_literal_must_be_finite() {
        // 1e309 written out in full overflows f64
        let huge = format!("1{}", "0".repeat(309));
        assert!(parse(&huge).is_err());
    }

    #[test]
    fn test_print_minimal_parens() {
        let cases = [
            ("1+2*3", "1+2*3"),
            ("(1+2)*3", "(1+2)*3"),
            ("1+(2+3)", "1+2+3"),
            ("1-(2-3)", "1-(2-3)"),
            ("1-(2+3)", "1-(2+3)"),
            ("1+(2-3)", "1+2-3"),
            ("2*(3*4)", "2*3*4"),
            ("2*(3/4)", "2*3/4"),
            ("2/(3*4)", "2/(3*4)"),
            ("2/(3/4)", "2/(3/4)"),
            ("-(1+2)", "-(1+2)"),
            ("-(1*2)", "-(1*2)"),
            ("-1*2", "-1*2"),
            ("1--2", "1--2"),
            ("1-(-2)", "1--2"),
            ("+1", "+1"),
            ("((A1))", "A1"),
            ("(A1+B2)/C3", "(A1+B2)/C3"),
        ];
        for (input, expected) in cases {
            assert_eq!(parse(input).unwrap().to_string(), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_print_reparse_idempotent() {
        let samples = [
            "1+2*3",
            "(1+2)*3",
            "1-(2-3)",
            "-(A1+B2)*3",
            "--1+-2",
            "A1/B1/C1",
            "1.5*(2+A1)-3/B2",
            "ZZZ9999+1",
        ];
        for input in samples {
            let printed = parse(input).unwrap().to_string();
            let reprinted = parse(&printed).unwrap().to_string();
            assert_eq!(printed, reprinted, "input: {}", input);
        }
    }

    #[test]
    fn test_number_printing() {
        assert_eq!(parse("7").unwrap().to_string(), "7");
        assert_eq!(parse("0.5").unwrap().to_string(), "0.5");
        assert_eq!(parse("1.250").unwrap().to_string(), "1.25");
    }
}
