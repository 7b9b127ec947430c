//! Engine settings.
//!
//! Every field can be set as a command-line flag or through its `WASTEPAY_*`
//! environment variable; flags win.

use clap::Args;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Args)]
pub struct EngineConfig {
    /// Currency assigned to newly created wallets
    #[arg(long, env = "WASTEPAY_CURRENCY", default_value = "INR")]
    pub currency: String,

    /// Commission percentage captured on new orders
    #[arg(long, env = "WASTEPAY_COMMISSION_PERCENTAGE", default_value = "10")]
    pub commission_percentage: Decimal,

    /// Page size used when a history query does not name one
    #[arg(long, env = "WASTEPAY_DEFAULT_PAGE_LIMIT", default_value_t = 10)]
    pub default_page_limit: u32,

    /// Largest page size a history query may ask for
    #[arg(long, env = "WASTEPAY_MAX_PAGE_LIMIT", default_value_t = 100)]
    pub max_page_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            commission_percentage: Decimal::TEN,
            default_page_limit: 10,
            max_page_limit: 100,
        }
    }
}
