#[derive(Debug, thiserror::Error)]
pub enum FailsafeError {
    #[error("failsafe already armed for fabric {armed}, request was for fabric {requested}")]
    ArmedForDifferentFabric { armed: u8, requested: u8 },
    #[error("ArmFailSafe must come from a PASE session or an already-armed CASE commissioning window")]
    RequiresPaseOrArmedCase,
    #[error("CommissioningComplete must arrive over CASE")]
    RequiresCase,
    #[error("CommissioningComplete fabric {accessing} does not match armed fabric {armed}")]
    FabricMismatch { accessing: u8, armed: u8 },
    #[error("failsafe is not armed")]
    NotArmed,
    #[error("cumulative failsafe budget of {limit_secs}s exhausted for this commissioning session")]
    CumulativeBudgetExhausted { limit_secs: u64 },
}
