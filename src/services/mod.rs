pub mod aggregator;
pub mod health_ledger;
pub mod probe_scheduler;
pub mod scorer;
pub mod stream_prober;

pub use aggregator::{Aggregator, RankingResult, RunReport};
pub use health_ledger::HealthLedger;
pub use probe_scheduler::{ProbeOutcome, ProbeScheduler, ProbeStats};
pub use scorer::Scorer;
pub use stream_prober::StreamProber;
