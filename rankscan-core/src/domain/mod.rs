//! Domain types shared across the pipeline.

pub mod bar;
pub mod instrument;
pub mod quote;

pub use bar::Bar;
pub use instrument::{Instrument, Market, MarketFilter};
pub use quote::Quote;
