//! Domain types shared across the engine.

pub mod market;
pub mod portfolio;
pub mod position;
pub mod signal;
pub mod trade;

pub use market::{MarketDataError, PriceTable, SectorMap};
pub use portfolio::PortfolioState;
pub use position::Position;
pub use signal::{Direction, RiskBudgets, Signal, SignalCategory, SignalError, SignalTable};
pub use trade::{ExitReason, Trade};
