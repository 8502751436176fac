//! Calculator tool: evaluates arithmetic expressions.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := power (('*' | '/' | '%') power)*
//! power  := unary ('^' power)?
//! unary  := '-' unary | atom
//! atom   := number | '(' expr ')'
//! ```

use agentwire_core::error::ToolError;
use agentwire_core::tool::{Tool, required_str};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::iter::Peekable;
use std::str::Chars;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses and decimals."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let expr = required_str(&arguments, "expression")?;
        let value = evaluate(expr).map_err(ToolError::InvalidInput)?;
        Ok(json!(format_number(value)))
    }
}

/// Render whole numbers without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut parser = Parser {
        chars: expr.chars().peekable(),
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if let Some(c) = parser.chars.peek() {
        return Err(format!("unexpected '{c}'"));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".into());
    }
    Ok(value)
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        self.chars.next_if_eq(&expected).is_some()
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut acc = self.term()?;
        loop {
            if self.eat('+') {
                acc += self.term()?;
            } else if self.eat('-') {
                acc -= self.term()?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut acc = self.power()?;
        loop {
            if self.eat('*') {
                acc *= self.power()?;
            } else if self.eat('/') {
                let rhs = self.power()?;
                if rhs == 0.0 {
                    return Err("division by zero".into());
                }
                acc /= rhs;
            } else if self.eat('%') {
                let rhs = self.power()?;
                if rhs == 0.0 {
                    return Err("modulo by zero".into());
                }
                acc %= rhs;
            } else {
                return Ok(acc);
            }
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.unary()?;
        if self.eat('^') {
            return Ok(base.powf(self.power()?));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<f64, String> {
        if self.eat('(') {
            let value = self.expr()?;
            if !self.eat(')') {
                return Err("missing closing parenthesis".into());
            }
            return Ok(value);
        }
        self.skip_ws();
        let mut literal = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
            literal.push(c);
        }
        match self.chars.peek() {
            _ if !literal.is_empty() => literal.parse().map_err(|_| format!("invalid number '{literal}'")),
            Some(c) => Err(format!("unexpected '{c}'")),
            None => Err("unexpected end of expression".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2").unwrap(), 4.0);
        assert_eq!(evaluate("17 % 5").unwrap(), 2.0);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(evaluate("1 / 0").unwrap_err().contains("division by zero"));
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("abc").is_err());
        assert!(evaluate("1.2.3").is_err());
    }

    #[tokio::test]
    async fn tool_formats_integers() {
        let out = CalculatorTool.execute(json!({"expression": "6 * 7"})).await.unwrap();
        assert_eq!(out, json!("42"));
        let out = CalculatorTool.execute(json!({"expression": "1 / 4"})).await.unwrap();
        assert_eq!(out, json!("0.25"));
    }

    #[tokio::test]
    async fn tool_reports_invalid_input() {
        let err = CalculatorTool.execute(json!({"expression": "2 *"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
