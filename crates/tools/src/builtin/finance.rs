use async_trait::async_trait;
use serde_json::{Value, json};

use crate::args::{optional_u64, required_f64};
use crate::{Tool, ToolContext, ToolError};

/// Compound interest: `A = P (1 + r/n)^(n t)`.
pub struct CalculateCompoundInterest;

#[async_trait]
impl Tool for CalculateCompoundInterest {
    fn name(&self) -> &str {
        "calculate_compound_interest"
    }

    fn description(&self) -> &str {
        "Calculate compound interest on an investment or loan. Returns the final amount and the interest earned."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "principal": {
                    "type": "number",
                    "description": "Initial amount of money"
                },
                "rate": {
                    "type": "number",
                    "description": "Annual interest rate, as a percentage (5 for 5%) or a fraction (0.05)"
                },
                "years": {
                    "type": "number",
                    "description": "Number of years the money is invested"
                },
                "times_compounded": {
                    "type": "integer",
                    "description": "How many times per year interest is compounded (default: 12)"
                }
            },
            "required": ["principal", "rate", "years"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let principal = required_f64(&args, "principal")?;
        let rate = required_f64(&args, "rate")?;
        let years = required_f64(&args, "years")?;
        let n = optional_u64(&args, "times_compounded")?.unwrap_or(12);

        if principal < 0.0 {
            return Err(ToolError::InvalidInput("principal must not be negative".into()));
        }
        if years < 0.0 {
            return Err(ToolError::InvalidInput("years must not be negative".into()));
        }
        if n == 0 {
            return Err(ToolError::InvalidInput(
                "times_compounded must be at least 1".into(),
            ));
        }

        let rate = if rate > 1.0 { rate / 100.0 } else { rate };
        let n = n as f64;
        let amount = principal * (1.0 + rate / n).powf(n * years);

        Ok(json!({
            "principal": principal,
            "annual_rate": rate,
            "years": years,
            "times_compounded": n,
            "final_amount": cents(amount),
            "interest_earned": cents(amount - principal),
        }))
    }
}

fn cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(args: Value) -> Result<Value, ToolError> {
        CalculateCompoundInterest
            .execute(args, &ToolContext::new("."))
            .await
    }

    #[tokio::test]
    async fn yearly_compounding() {
        let out = run(json!({"principal": 1000, "rate": 5, "years": 2, "times_compounded": 1}))
            .await
            .unwrap();
        assert_eq!(out["final_amount"], 1102.5);
        assert_eq!(out["interest_earned"], 102.5);
    }

    #[tokio::test]
    async fn fraction_rate_and_monthly_default() {
        let out = run(json!({"principal": 1000, "rate": 0.05, "years": 10}))
            .await
            .unwrap();
        // 1000 * (1 + 0.05/12)^120
        assert_eq!(out["final_amount"], 1647.01);
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        assert!(matches!(
            run(json!({"principal": -1, "rate": 5, "years": 1})).await,
            Err(ToolError::InvalidInput(_))
        ));
        assert!(matches!(
            run(json!({"principal": 1, "rate": 5, "years": 1, "times_compounded": 0})).await,
            Err(ToolError::InvalidInput(_))
        ));
        assert!(matches!(
            run(json!({"rate": 5, "years": 1})).await,
            Err(ToolError::InvalidInput(_))
        ));
    }
}
