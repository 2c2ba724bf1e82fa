use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("unexpected end of expression '{0}'")]
    UnexpectedEnd(String),
    #[error("unexpected '{found}' in expression '{expr}'")]
    Unexpected { found: char, expr: String },
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("division by zero in expression '{0}'")]
    DivisionByZero(String),
}

/// What the short names `w` and `h` stand for in an expression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShortNames {
    /// The frame, as in drawtext.
    Frame,
    /// The box being drawn, as in drawbox. `None` until the box size is known.
    Box(Option<(f64, f64)>),
}

/// Dimensions an overlay option expression may refer to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameVariables {
    pub width: f64,
    pub height: f64,
    pub short_names: ShortNames,
}

impl FrameVariables {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            short_names: ShortNames::Frame,
        }
    }

    /// Scopes `w` and `h` to a box of the given size; `iw` and `ih` still
    /// name the frame.
    pub fn for_box(self, size: Option<(f64, f64)>) -> Self {
        Self {
            short_names: ShortNames::Box(size),
            ..self
        }
    }

    fn lookup(&self, name: &str) -> Option<f64> {
        match (name, self.short_names) {
            ("iw" | "in_w", _) => Some(self.width),
            ("ih" | "in_h", _) => Some(self.height),
            ("w" | "W" | "main_w", ShortNames::Frame) => Some(self.width),
            ("h" | "H" | "main_h", ShortNames::Frame) => Some(self.height),
            ("w", ShortNames::Box(size)) => size.map(|(w, _)| w),
            ("h", ShortNames::Box(size)) => size.map(|(_, h)| h),
            _ => None,
        }
    }
}

/// Evaluates an arithmetic option expression such as `ih-68` or `(h-53)`.
///
/// Supports `+ - * /`, unary signs, parentheses, decimal literals and the
/// frame-size variables.
pub fn evaluate(expr: &str, vars: FrameVariables) -> Result<f64, ExpressionError> {
    let mut parser = Parser {
        expr,
        chars: expr.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
        vars,
    };
    let value = parser.sum()?;
    match parser.peek() {
        None => Ok(value),
        Some(found) => Err(ExpressionError::Unexpected {
            found,
            expr: expr.to_string(),
        }),
    }
}

struct Parser<'a> {
    expr: &'a str,
    chars: Vec<char>,
    pos: usize,
    vars: FrameVariables,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn sum(&mut self) -> Result<f64, ExpressionError> {
        let mut value = self.product()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.bump();
            let rhs = self.product()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn product(&mut self) -> Result<f64, ExpressionError> {
        let mut value = self.unary()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.bump();
            let rhs = self.unary()?;
            if op == '*' {
                value *= rhs;
            } else if rhs == 0.0 {
                return Err(ExpressionError::DivisionByZero(self.expr.to_string()));
            } else {
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, ExpressionError> {
        match self.peek() {
            Some('-') => {
                self.bump();
                Ok(-self.unary()?)
            }
            Some('+') => {
                self.bump();
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64, ExpressionError> {
        match self.peek() {
            None => Err(ExpressionError::UnexpectedEnd(self.expr.to_string())),
            Some('(') => {
                self.bump();
                let value = self.sum()?;
                match self.bump() {
                    Some(')') => Ok(value),
                    Some(found) => Err(ExpressionError::Unexpected {
                        found,
                        expr: self.expr.to_string(),
                    }),
                    None => Err(ExpressionError::UnexpectedEnd(self.expr.to_string())),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '.')
                {
                    self.bump();
                }
                let literal: String = self.chars[start..self.pos].iter().collect();
                literal.parse().map_err(|_| ExpressionError::Unexpected {
                    found: c,
                    expr: self.expr.to_string(),
                })
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    self.bump();
                }
                let name: String = self.chars[start..self.pos].iter().collect();
                self.vars
                    .lookup(&name)
                    .ok_or(ExpressionError::UnknownVariable(name))
            }
            Some(found) => Err(ExpressionError::Unexpected {
                found,
                expr: self.expr.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const HD: FrameVariables = FrameVariables {
        width: 1280.0,
        height: 720.0,
        short_names: ShortNames::Frame,
    };

    #[rstest]
    #[case::literal("20", 20.0)]
    #[case::bar_top("ih-68", 652.0)]
    #[case::parenthesised("(h-53)", 667.0)]
    #[case::precedence("iw/2-10*2", 620.0)]
    #[case::unary_minus("-w+1300", 20.0)]
    #[case::nested("((in_h))", 720.0)]
    #[case::spaces(" ih - 68 ", 652.0)]
    #[case::decimal("0.5*W", 640.0)]
    fn test_evaluate(#[case] expr: &str, #[case] expected: f64) {
        assert_relative_eq!(evaluate(expr, HD).unwrap(), expected);
    }

    #[rstest]
    #[case::box_height("ih-h", 652.0)]
    #[case::box_width("(iw-w)/2", 640.0)]
    fn test_box_short_names(#[case] expr: &str, #[case] expected: f64) {
        let vars = HD.for_box(Some((640.0, 68.0)));
        assert_relative_eq!(evaluate(expr, vars).unwrap(), expected);
    }

    #[rstest]
    #[case::size_not_known_yet("w", None)]
    #[case::main_width("W", Some((640.0, 68.0)))]
    fn test_box_scope_rejects(#[case] expr: &str, #[case] size: Option<(f64, f64)>) {
        assert_eq!(
            evaluate(expr, HD.for_box(size)),
            Err(ExpressionError::UnknownVariable(expr.into()))
        );
    }

    #[test]
    fn test_unknown_variable() {
        assert_eq!(
            evaluate("t*2", HD),
            Err(ExpressionError::UnknownVariable("t".into()))
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            evaluate("iw/0", HD),
            Err(ExpressionError::DivisionByZero(_))
        ));
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        assert!(matches!(
            evaluate("(ih-68", HD),
            Err(ExpressionError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(matches!(
            evaluate("ih)", HD),
            Err(ExpressionError::Unexpected { found: ')', .. })
        ));
    }
}
