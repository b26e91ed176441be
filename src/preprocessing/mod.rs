//! Data preprocessing
//!
//! Feature scaling is fitted per fold on the train split only and then
//! replayed verbatim on the held-out split.

mod scaler;

pub use scaler::{MinMaxScaler, ScalerState};
