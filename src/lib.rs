//! Speech-intelligibility modeling: speech material, filterbanks and the
//! sEPSM ideal observer.

pub mod cli;
pub mod config;
pub mod core;
pub mod material;

pub use crate::core::ideal_obs::{FitOptions, IdealObs, IdealObsError, IdealObsParams, ParamsUpdate};
pub use crate::material::{Material, MaterialError};
