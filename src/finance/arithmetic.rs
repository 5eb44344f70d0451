//! Arithmetic tools shared by the financial, investment and wealth agents

use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AgentsError, Result};
use crate::tool::{FunctionTool, Tool};

/// Two operands. For `percent_change`, `x` is the initial value and `y` the
/// final value.
#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
pub struct Operands {
    /// First operand.
    pub x: f64,
    /// Second operand.
    pub y: f64,
}

/// Infinite or NaN results would serialize as JSON `null`.
fn finite(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AgentsError::tool("Result is not a finite number."))
    }
}

pub fn add(Operands { x, y }: Operands) -> Result<f64> {
    finite(x + y)
}

pub fn subtract(Operands { x, y }: Operands) -> Result<f64> {
    finite(x - y)
}

pub fn multiply(Operands { x, y }: Operands) -> Result<f64> {
    finite(x * y)
}

pub fn divide(Operands { x, y }: Operands) -> Result<f64> {
    if y == 0.0 {
        return Err(AgentsError::tool("Division by zero: y cannot be zero."));
    }
    finite(x / y)
}

/// `(y - x) / |x| * 100`
pub fn percent_change(Operands { x, y }: Operands) -> Result<f64> {
    if x == 0.0 {
        return Err(AgentsError::tool(
            "Initial value x cannot be zero for percent change.",
        ));
    }
    finite((y - x) / x.abs() * 100.0)
}

/// The five arithmetic tools, in registration order.
pub fn arithmetic_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(FunctionTool::typed("addition", "Add two numbers.", add)),
        Arc::new(FunctionTool::typed(
            "subtraction",
            "Subtract the second number from the first.",
            subtract,
        )),
        Arc::new(FunctionTool::typed(
            "multiplication",
            "Multiply two numbers.",
            multiply,
        )),
        Arc::new(FunctionTool::typed(
            "division",
            "Divide the first number by the second.",
            divide,
        )),
        Arc::new(FunctionTool::typed(
            "percent_change",
            "Calculate the percent change from the initial value x to the final value y.",
            percent_change,
        )),
    ]
}
