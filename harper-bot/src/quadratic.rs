//! Closed-form quadratic solver.
//!
//! Everything here is a pure function of an [`Equation`]: roots, vertex,
//! the two textual forms, and a sampled curve between the roots for
//! plotting. Failures are [`DomainError`]s naming the precondition that
//! did not hold; nothing is retried or partially returned.

use std::fmt;

/// A mathematical precondition that does not hold for the given input.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// `a = 0`: the expression is linear, not quadratic.
    #[error("not a quadratic: the x^2 coefficient must not be 0")]
    NotQuadratic,
    /// `b² − 4ac < 0`: no real roots.
    #[error("no real roots: the discriminant is {discriminant}, which is negative")]
    ComplexRoots { discriminant: f64 },
    /// Sampling step that would never reach the upper root.
    #[error("invalid sampling step {step}: it must be a positive, finite number")]
    InvalidStep { step: f64 },
}

/// `a·x² + b·x + c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Equation {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Equation {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// `b² − 4ac`.
    pub fn discriminant(&self) -> f64 {
        self.b * self.b - 4.0 * self.a * self.c
    }

    /// Value of the polynomial at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.a * x * x + self.b * x + self.c
    }

    /// Both real roots, `((−b + √D)/2a, (−b − √D)/2a)`. Not ordered.
    pub fn roots(&self) -> Result<(f64, f64), DomainError> {
        self.ensure_quadratic()?;
        let discriminant = self.discriminant();
        if discriminant < 0.0 {
            return Err(DomainError::ComplexRoots { discriminant });
        }
        let sqrt_d = discriminant.sqrt();
        let x1 = (-self.b + sqrt_d) / (2.0 * self.a);
        let x2 = (-self.b - sqrt_d) / (2.0 * self.a);
        Ok((x1, x2))
    }

    /// Turning point `(h, k)`.
    pub fn vertex(&self) -> Result<(f64, f64), DomainError> {
        self.ensure_quadratic()?;
        let h = -self.b / (2.0 * self.a);
        let k = (4.0 * self.a * self.c - self.b * self.b) / (4.0 * self.a);
        Ok((h, k))
    }

    /// `"{a}x^2 + {b}x + {c}"`, coefficients substituted as-is.
    pub fn standard_form(&self) -> String {
        format!("{}x^2 + {}x + {}", self.a, self.b, self.c)
    }

    /// `"{a}(x-{h})^2 + {k}"`.
    pub fn vertex_form(&self) -> Result<String, DomainError> {
        let (h, k) = self.vertex()?;
        Ok(format!("{}(x-{h})^2 + {k}", self.a))
    }

    /// Points on the curve from the smaller root towards the larger one,
    /// `step` apart, stopping once `x` reaches the larger root.
    pub fn sample_curve(&self, step: f64) -> Result<CurveSample, DomainError> {
        let (x1, x2) = self.roots()?;
        self.sample_range(x1.min(x2), x1.max(x2), step)
    }

    /// Like [`sample_curve`](Self::sample_curve) over an arbitrary `[low, high)` window.
    pub fn sample_range(&self, low: f64, high: f64, step: f64) -> Result<CurveSample, DomainError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(DomainError::InvalidStep { step });
        }
        Ok(CurveSample {
            equation: *self,
            next: low,
            high,
            step,
        })
    }

    fn ensure_quadratic(&self) -> Result<(), DomainError> {
        if self.a == 0.0 {
            Err(DomainError::NotQuadratic)
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.standard_form())
    }
}

/// Lazy `(x, y)` sequence produced by [`Equation::sample_curve`].
///
/// Cloning restarts from the clone point. The sequence is finite: every
/// point moves `x` forward, and a step too small to move it ends the run.
#[derive(Debug, Clone)]
pub struct CurveSample {
    equation: Equation,
    next: f64,
    high: f64,
    step: f64,
}

impl Iterator for CurveSample {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        // NaN bounds compare false and end the sequence.
        if !(self.next < self.high) {
            return None;
        }
        let x = self.next;
        let stepped = x + self.step;
        // A step under half an ulp of x rounds back to x.
        self.next = if stepped > x { stepped } else { self.high };
        Some((x, self.equation.evaluate(x)))
    }
}
