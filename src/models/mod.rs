//! Dual-energy response model.
//!
//! The model is a single pure function of the coefficient vector and the two
//! intensity channels, so the fitter and the quantifier always evaluate the
//! exact same expression.

pub mod rational;

pub use rational::*;
