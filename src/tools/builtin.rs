//! Built-in tools: wall clock and arithmetic calculator.

use crate::error::{AgentError, Result};

use super::Tool;

/// Reports the current local time.
pub struct ClockTool;

impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Get the current local date and time."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    fn invoke(&self, _args: serde_json::Value) -> Result<String> {
        Ok(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

/// Evaluates arithmetic expressions.
pub struct CalculatorTool;

impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / ^, \
         parentheses, and sqrt(x)."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression to evaluate, e.g. \"sqrt(2) * 3\""
                }
            },
            "required": ["expression"]
        })
    }

    fn invoke(&self, args: serde_json::Value) -> Result<String> {
        let expression = args
            .get("expression")
            .and_then(|e| e.as_str())
            .unwrap_or_default();
        let value = eval(expression)?;
        // Trim float noise but keep real precision.
        let rounded = (value * 1e10).round() / 1e10;
        if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
            Ok(format!("{}", rounded as i64))
        } else {
            Ok(format!("{rounded}"))
        }
    }
}

/// Evaluate an arithmetic expression.
fn eval(input: &str) -> Result<f64> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    let value = parser.expression()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(AgentError::Tool(format!(
            "unexpected character '{}' at position {}",
            parser.chars[parser.pos], parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(AgentError::Tool("expression result is not finite".into()));
    }
    Ok(value)
}

/// Recursive-descent parser: expression / term / power / atom.
struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                '+' => {
                    self.pos += 1;
                    value += self.term()?;
                }
                '-' => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.power()?;
        while let Some(op) = self.peek() {
            match op {
                '*' => {
                    self.pos += 1;
                    value *= self.power()?;
                }
                '/' => {
                    self.pos += 1;
                    let divisor = self.power()?;
                    if divisor == 0.0 {
                        return Err(AgentError::Tool("division by zero".into()));
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn power(&mut self) -> Result<f64> {
        let base = self.atom()?;
        if self.peek() == Some('^') {
            self.pos += 1;
            // Right-associative.
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.atom()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expression()?;
                if self.peek() != Some(')') {
                    return Err(AgentError::Tool("missing closing parenthesis".into()));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.function(),
            Some(c) => Err(AgentError::Tool(format!("unexpected character '{c}'"))),
            None => Err(AgentError::Tool("unexpected end of expression".into())),
        }
    }

    fn number(&mut self) -> Result<f64> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.chars.len()
            && (self.chars[self.pos].is_ascii_digit() || self.chars[self.pos] == '.')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| AgentError::Tool(format!("invalid number '{text}'")))
    }

    fn function(&mut self) -> Result<f64> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.chars.len() && self.chars[self.pos].is_ascii_alphabetic() {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        if self.peek() != Some('(') {
            return Err(AgentError::Tool(format!(
                "expected '(' after function '{name}'"
            )));
        }
        self.pos += 1;
        let arg = self.expression()?;
        if self.peek() != Some(')') {
            return Err(AgentError::Tool("missing closing parenthesis".into()));
        }
        self.pos += 1;
        match name.as_str() {
            "sqrt" => {
                if arg < 0.0 {
                    return Err(AgentError::Tool("sqrt of negative number".into()));
                }
                Ok(arg.sqrt())
            }
            "abs" => Ok(arg.abs()),
            _ => Err(AgentError::Tool(format!("unknown function '{name}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc(expr: &str) -> String {
        CalculatorTool
            .invoke(serde_json::json!({"expression": expr}))
            .unwrap()
    }

    #[test]
    fn basic_arithmetic() {
        assert_eq!(calc("1 + 2 * 3"), "7");
        assert_eq!(calc("(1 + 2) * 3"), "9");
        assert_eq!(calc("10 / 4"), "2.5");
        assert_eq!(calc("2 ^ 10"), "1024");
    }

    #[test]
    fn unary_minus_and_nesting() {
        assert_eq!(calc("-3 + 5"), "2");
        assert_eq!(calc("2 * (3 - (1 + 1))"), "2");
    }

    #[test]
    fn sqrt_two_to_three_decimals() {
        let value: f64 = calc("sqrt(2)").parse().unwrap();
        assert_eq!(format!("{value:.3}"), "1.414");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(CalculatorTool
            .invoke(serde_json::json!({"expression": "1 / 0"}))
            .is_err());
    }

    #[test]
    fn malformed_expression_is_an_error() {
        assert!(CalculatorTool
            .invoke(serde_json::json!({"expression": "2 +"}))
            .is_err());
        assert!(CalculatorTool
            .invoke(serde_json::json!({"expression": "(1 + 2"}))
            .is_err());
        assert!(CalculatorTool
            .invoke(serde_json::json!({"expression": "nope(3)"}))
            .is_err());
    }

    #[test]
    fn clock_returns_formatted_timestamp() {
        let out = ClockTool.invoke(serde_json::json!({})).unwrap();
        // YYYY-MM-DD HH:MM:SS
        assert_eq!(out.len(), 19);
        assert_eq!(&out[4..5], "-");
        assert_eq!(&out[13..14], ":");
    }
}
