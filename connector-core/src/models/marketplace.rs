//! Marketplace (commerce platform) request and asset models.

/// Fulfillment request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Purchase,
    Resume,
    Change,
    Suspend,
    Cancel,
    Unknown,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Purchase => "purchase",
            RequestKind::Resume => "resume",
            RequestKind::Change => "change",
            RequestKind::Suspend => "suspend",
            RequestKind::Cancel => "cancel",
            RequestKind::Unknown => "unknown",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "purchase" => RequestKind::Purchase,
            "resume" => RequestKind::Resume,
            "change" => RequestKind::Change,
            "suspend" => RequestKind::Suspend,
            "cancel" => RequestKind::Cancel,
            _ => RequestKind::Unknown,
        }
    }

    /// Request types that go through the provisioning path.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            RequestKind::Purchase | RequestKind::Resume | RequestKind::Change
        )
    }
}

/// Marketplace-side asset lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    Active,
    Suspended,
    Terminated,
    Unknown,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Active => "active",
            AssetStatus::Suspended => "suspended",
            AssetStatus::Terminated => "terminated",
            AssetStatus::Unknown => "unknown",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => AssetStatus::Active,
            "suspended" => AssetStatus::Suspended,
            "terminated" => AssetStatus::Terminated,
            _ => AssetStatus::Unknown,
        }
    }

    /// Statuses for which usage reporting is being closed out.
    pub fn is_halted(&self) -> bool {
        matches!(self, AssetStatus::Suspended | AssetStatus::Terminated)
    }
}

/// Asset or tier-config parameter.
#[derive(Debug, Clone, Default)]
pub struct Param {
    pub id: String,
    pub value: Option<String>,
    /// Validation message shown to the customer on an inquire outcome.
    pub value_error: Option<String>,
}

impl Param {
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }
}

/// One billable item of an asset.
#[derive(Debug, Clone)]
pub struct BillableItem {
    pub mpn: String,
    pub quantity: i64,
    /// Configured per-item ceiling; `-1` means no ceiling.
    pub hard_limit: i64,
}

/// Customer/partner tier reference.
#[derive(Debug, Clone)]
pub struct Tier {
    pub id: String,
    pub name: String,
}

/// Marketplace asset, tied one-to-one to an infrastructure project.
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: String,
    pub status: AssetStatus,
    pub marketplace_id: String,
    pub product_id: String,
    pub contract_id: String,
    pub customer: Tier,
    pub tier1: Tier,
    pub params: Vec<Param>,
    pub items: Vec<BillableItem>,
}

impl Asset {
    pub fn param(&self, id: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.id == id)
    }

    /// Non-empty value of a parameter, if present.
    pub fn param_value(&self, id: &str) -> Option<&str> {
        self.param(id).and_then(Param::value)
    }

    pub fn item(&self, mpn: &str) -> Option<&BillableItem> {
        self.items.iter().find(|i| i.mpn.eq_ignore_ascii_case(mpn))
    }
}

/// A typed fulfillment request from the marketplace.
#[derive(Debug, Clone)]
pub struct FulfillmentRequest {
    pub id: String,
    pub kind: RequestKind,
    /// Migration of this asset is owned by an external service.
    pub needs_migration: bool,
    pub asset: Asset,
}

/// Per-product activation answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationAnswer {
    /// Marketplace activation template id.
    Template(String),
    /// Inline activation tile text.
    Tile(String),
}

impl ActivationAnswer {
    /// Template ids carry a `TL` prefix in the config; everything else
    /// is inline tile text.
    pub fn from_config_value(value: &str) -> Self {
        if value.starts_with("TL") {
            ActivationAnswer::Template(value.to_string())
        } else {
            ActivationAnswer::Tile(value.to_string())
        }
    }
}

/// Terminal outcome of processing one fulfillment request.
#[derive(Debug, Clone)]
pub enum FulfillmentOutcome {
    Approve(ActivationAnswer),
    Fail(String),
    /// Ask the customer to correct the listed parameters.
    Inquire(Vec<Param>),
    Skip(Option<String>),
}
