// src/model.rs
// Normalized records extracted from site pages. Amounts are integer cents;
// sites render them with grouping and currency signs, never machine-readable.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub label: String,
    pub balance_cents: i64,
    /// Relative URL of the account's detail/history page, when the site
    /// links one.
    pub link: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxKind {
    Transfer,
    Order,
    Card,
    Withdrawal,
    Check,
    Bank,
    Deposit,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Operation date as displayed (dd/mm/yyyy on the observed sites).
    pub date: String,
    pub label: String,
    pub kind: TxKind,
    pub amount_cents: i64,
}

impl TxKind {
    /// Classify a raw operation label by its prefix.
    pub fn classify(raw: &str) -> TxKind {
        let up = raw.trim().to_ascii_uppercase();
        if up.starts_with("VIREMENT") || up.starts_with("VIR ") {
            TxKind::Transfer
        } else if up.starts_with("PRLV ") {
            TxKind::Order
        } else if up.starts_with("CB ") {
            TxKind::Card
        } else if up.starts_with("DAB ") {
            TxKind::Withdrawal
        } else if up == "CHEQUE" || up.starts_with("CHEQUE ") {
            TxKind::Check
        } else if up.starts_with("COTIS") || up.starts_with("INTERETS") {
            TxKind::Bank
        } else if up.starts_with("REMISE ") {
            TxKind::Deposit
        } else {
            TxKind::Unknown
        }
    }
}
