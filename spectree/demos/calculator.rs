//! A small spec tree for an RPN calculator, runnable from the command line.
//!
//! ```bash
//! cargo run --example calculator
//! cargo run --example calculator -- --exclude-tags slow --format json
//! cargo run --example calculator -- --list
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result, bail, ensure};
use spectree::{
    Variable, after_all, before_each, composite, describe, include_tags, it, let_value, pending,
    tag,
};

#[derive(Debug, Default)]
struct Calculator {
    stack: Vec<i64>,
}

impl Calculator {
    fn push(&mut self, value: i64) {
        self.stack.push(value);
    }

    fn apply(&mut self, op: char) -> Result<i64> {
        let rhs = self.stack.pop().context("stack underflow")?;
        let lhs = self.stack.pop().context("stack underflow")?;
        let value = match op {
            '+' => lhs.checked_add(rhs),
            '-' => lhs.checked_sub(rhs),
            '*' => lhs.checked_mul(rhs),
            '/' => lhs.checked_div(rhs),
            other => bail!("unknown operator {other:?}"),
        }
        .with_context(|| format!("{lhs} {op} {rhs} overflows or divides by zero"))?;
        self.stack.push(value);
        Ok(value)
    }

    fn eval(&mut self, program: &str) -> Result<i64> {
        for token in program.split_whitespace() {
            match token.parse::<i64>() {
                Ok(value) => self.push(value),
                Err(_) => {
                    let mut chars = token.chars();
                    match (chars.next(), chars.next()) {
                        (Some(op), None) => {
                            self.apply(op)?;
                        }
                        _ => bail!("unknown token {token:?}"),
                    }
                }
            }
        }
        self.stack.last().copied().context("empty program")
    }
}

fn main() -> ExitCode {
    spectree::harness::main("calculator", || {
        let calculator = let_value(Calculator::default);

        describe("arithmetic", || {
            let calc = calculator.clone();
            it("adds", move || -> Result<()> {
                let value = calc.update(|c| c.eval("2 3 +")).context("no calculator")??;
                ensure!(value == 5, "expected 5, got {value}");
                Ok(())
            });

            let calc = calculator.clone();
            it("divides (integer)", move || -> Result<()> {
                let value = calc.update(|c| c.eval("7 2 /")).context("no calculator")??;
                ensure!(value == 3, "expected 3, got {value}");
                Ok(())
            });

            let calc = calculator.clone();
            it("rejects division by zero", move || -> Result<()> {
                let outcome = calc.update(|c| c.eval("1 0 /")).context("no calculator")?;
                ensure!(outcome.is_err(), "division by zero succeeded");
                Ok(())
            });

            pending("supports exponentiation");
        });

        describe("stack", || {
            // let_value resets between steps
            composite("accumulates across steps", || {
                let calc = Variable::with_value(Calculator::default());
                let step = calc.clone();
                it("push operands", move || {
                    step.update(|c| {
                        c.push(6);
                        c.push(7);
                    });
                });
                it("multiply", move || -> Result<()> {
                    let value = calc.update(|c| c.apply('*')).context("no calculator")??;
                    ensure!(value == 42, "expected 42, got {value}");
                    Ok(())
                });
            });
        });

        describe("soak", || {
            include_tags(["slow", "overflow"]);
            let runs = Variable::with_value(0_u32);
            let counted = runs.clone();
            before_each(move || {
                counted.update(|count| *count += 1);
            });
            after_all(move || {
                tracing::info!(runs = ?runs.get(), "soak suite finished");
            });

            tag(["slow"]);
            let calc = calculator.clone();
            it("sums a long program", move || -> Result<()> {
                let program = std::iter::repeat_n("1 +", 999)
                    .fold(String::from("1"), |program, step| program + " " + step);
                let value = calc.update(|c| c.eval(&program)).context("no calculator")??;
                ensure!(value == 1000, "expected 1000, got {value}");
                Ok(())
            });

            tag(["overflow"]);
            let calc = calculator.clone();
            it("detects overflow", move || -> Result<()> {
                let program = format!("{} 1 +", i64::MAX);
                let outcome = calc.update(|c| c.eval(&program)).context("no calculator")?;
                ensure!(outcome.is_err(), "overflow went unnoticed");
                Ok(())
            });
        });
    })
}
