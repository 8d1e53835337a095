pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod payout;
pub mod settlement;

pub use config::Config;
pub use db::{init_db, LedgerTx, Repository};
pub use domain::{
    Address, Commission, CommissionKind, CommissionStatus, Decimal, LegSide, Member, MemberId,
    OrderId, Tier, TimeMs,
};
pub use engine::{CommissionCalculator, CommissionError, ProcessOutcome};
pub use error::AppError;
pub use orchestration::Services;
pub use payout::{PayoutBatcher, PayoutError, PayoutOutcome};
pub use settlement::{HttpSettlementClient, MockSettlementClient, SettlementClient};
