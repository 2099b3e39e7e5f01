//! Named functions callable from expressions.

use std::collections::HashMap;

use arcstr::ArcStr;
use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use unicase::UniCase;

lazy_static! {
    static ref BUILTIN: FunctionRegistry = FunctionRegistry::default();
}

/// A function callable from an expression.
#[derive(Copy, Clone)]
pub enum Function {
    /// A function of its arguments alone.
    Deterministic {
        /// The number of arguments.
        arity: usize,
        /// Computes the result.
        eval: fn(&[f64]) -> f64,
    },
    /// A function that samples a distribution parameterized by its arguments.
    Stochastic {
        /// The number of arguments.
        arity: usize,
        /// Draws a sample, or explains why the arguments are invalid.
        sample: fn(&mut StdRng, &[f64]) -> Result<f64, ArcStr>,
    },
}

/// The functions available to expressions, by case-insensitive name.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<UniCase<ArcStr>, Function>,
}

impl Function {
    /// The number of arguments this function takes.
    pub fn arity(&self) -> usize {
        match self {
            Self::Deterministic { arity, .. } | Self::Stochastic { arity, .. } => *arity,
        }
    }

    /// Returns `true` if calling this function consumes randomness.
    pub fn is_stochastic(&self) -> bool {
        matches!(self, Self::Stochastic { .. })
    }

    pub(crate) fn call(&self, rng: &mut StdRng, args: &[f64]) -> Result<f64, ArcStr> {
        match self {
            Self::Deterministic { eval, .. } => Ok(eval(args)),
            Self::Stochastic { sample, .. } => sample(rng, args),
        }
    }
}

fn unary(eval: fn(&[f64]) -> f64) -> Function {
    Function::Deterministic { arity: 1, eval }
}

fn binary(eval: fn(&[f64]) -> f64) -> Function {
    Function::Deterministic { arity: 2, eval }
}

fn uniform(rng: &mut StdRng, magnitude: f64) -> Result<f64, ArcStr> {
    let bound = magnitude.abs();
    if !bound.is_finite() {
        return Err(arcstr::format!("magnitude must be finite, found {magnitude}"));
    }
    if bound == 0.0 {
        return Ok(0.0);
    }
    Ok(rng.gen_range(-bound..=bound))
}

/// Normal(0, |sigma|).
fn gauss(rng: &mut StdRng, args: &[f64]) -> Result<f64, ArcStr> {
    let normal =
        Normal::new(0.0, args[0].abs()).map_err(|e| arcstr::format!("{e}: sigma = {}", args[0]))?;
    Ok(normal.sample(rng))
}

/// Uniform over [-|x|, |x|].
fn flat(rng: &mut StdRng, args: &[f64]) -> Result<f64, ArcStr> {
    uniform(rng, args[0])
}

/// `x` with a uniformly distributed relative tolerance.
fn mc(rng: &mut StdRng, args: &[f64]) -> Result<f64, ArcStr> {
    Ok(args[0] * (1.0 + uniform(rng, args[1])?))
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_stochastic() {
            "Stochastic"
        } else {
            "Deterministic"
        };
        f.debug_struct(kind).field("arity", &self.arity()).finish()
    }
}

impl FunctionRegistry {
    /// A registry with no functions.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// The shared registry of built-in functions.
    pub fn builtin() -> &'static FunctionRegistry {
        &BUILTIN
    }

    /// Adds a function, replacing any function of the same name.
    pub fn register(&mut self, name: impl Into<ArcStr>, function: Function) -> Option<Function> {
        self.functions.insert(UniCase::new(name.into()), function)
    }

    /// Looks up a function by name.
    pub fn get(&self, name: &str) -> Option<Function> {
        self.functions.get(&UniCase::new(ArcStr::from(name))).copied()
    }

    /// The registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &ArcStr> {
        self.functions.keys().map(|k| &**k)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("abs", unary(|a| a[0].abs()));
        registry.register("sqrt", unary(|a| a[0].sqrt()));
        registry.register("exp", unary(|a| a[0].exp()));
        registry.register("ln", unary(|a| a[0].ln()));
        registry.register("log", unary(|a| a[0].ln()));
        registry.register("log10", unary(|a| a[0].log10()));
        registry.register("sin", unary(|a| a[0].sin()));
        registry.register("cos", unary(|a| a[0].cos()));
        registry.register("tan", unary(|a| a[0].tan()));
        registry.register("atan", unary(|a| a[0].atan()));
        registry.register("floor", unary(|a| a[0].floor()));
        registry.register("ceil", unary(|a| a[0].ceil()));
        registry.register("round", unary(|a| a[0].round()));
        registry.register("min", binary(|a| a[0].min(a[1])));
        registry.register("max", binary(|a| a[0].max(a[1])));
        registry.register("pow", binary(|a| a[0].powf(a[1])));
        registry.register(
            "gauss",
            Function::Stochastic {
                arity: 1,
                sample: gauss,
            },
        );
        registry.register(
            "flat",
            Function::Stochastic {
                arity: 1,
                sample: flat,
            },
        );
        registry.register(
            "mc",
            Function::Stochastic {
                arity: 2,
                sample: mc,
            },
        );
        registry
    }
}
