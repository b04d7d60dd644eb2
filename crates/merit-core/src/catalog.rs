use crate::error::MeritError;
use crate::ledger;
use crate::types::{
    ProgressionRecord, Redemption, RedemptionStatus, StoreItem, StoreItemKind,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Registry of static store item definitions, validated at engine bootstrap.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    items: HashMap<String, StoreItem>,
}

impl ItemCatalog {
    /// Build the catalog. System items must be equippable (theme/frame) and
    /// unscoped; non-system items must carry an owning teacher.
    pub fn new(items: Vec<StoreItem>) -> Result<Self, MeritError> {
        let mut registry: HashMap<String, StoreItem> = HashMap::new();
        for item in items {
            if item.system && item.kind == StoreItemKind::Perk {
                return Err(MeritError::InvariantViolation(format!(
                    "system item '{}' must be a theme or frame",
                    item.id
                )));
            }
            if !item.system && item.owner_id.is_none() {
                return Err(MeritError::InvariantViolation(format!(
                    "non-system item '{}' has no owning teacher",
                    item.id
                )));
            }
            if registry.insert(item.id.clone(), item.clone()).is_some() {
                return Err(MeritError::InvariantViolation(format!(
                    "duplicate store item id '{}'",
                    item.id
                )));
            }
        }
        Ok(Self { items: registry })
    }

    pub fn get(&self, item_id: &str) -> Option<&StoreItem> {
        self.items.get(item_id)
    }

    /// Starting stock counts for every item with finite stock.
    pub fn initial_stock(&self) -> BTreeMap<String, u32> {
        self.items
            .values()
            .filter_map(|item| item.initial_stock.map(|stock| (item.id.clone(), stock)))
            .collect()
    }

    /// System items plus the given teacher's items, ordered by id.
    pub fn visible_to(&self, owner_id: Option<&str>) -> Vec<&StoreItem> {
        let mut items: Vec<&StoreItem> = self
            .items
            .values()
            .filter(|item| item.system || item.owner_id.as_deref() == owner_id)
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }
}

/// Store listing entry with display flags computed for one student.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub item: StoreItem,
    pub affordable: bool,
    pub owned: bool,
    /// None for unlimited items.
    pub remaining_stock: Option<u32>,
}

/// Compute the merged class listing for one student.
pub fn catalog_view(
    catalog: &ItemCatalog,
    stock: &BTreeMap<String, u32>,
    record: &ProgressionRecord,
    owner_id: Option<&str>,
) -> Vec<CatalogEntry> {
    catalog
        .visible_to(owner_id)
        .into_iter()
        .map(|item| CatalogEntry {
            affordable: record.coins >= item.price,
            owned: record.owns(&item.id),
            remaining_stock: item
                .initial_stock
                .map(|_| stock.get(&item.id).copied().unwrap_or(0)),
            item: item.clone(),
        })
        .collect()
}

/// Outcome of a purchase attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum PurchaseOutcome {
    Purchased { price: u64, equipped: bool },
    UnknownItem,
    NotInCatalog,
    AlreadyOwned,
    OutOfStock,
    InsufficientCoins { price: u64, coins: u64 },
}

/// Attempt a purchase against the working state.
///
/// Invariant handling:
/// - Finite stock decrements only while above zero and can never go negative.
/// - `allow_multiple = false` items fail while already owned.
/// - The coin debit and the stock decrement are one unit: when the debit
///   fails, the stock decrement is compensated before returning.
/// - System items equip their slot immediately on purchase.
pub fn apply_purchase(
    item: &StoreItem,
    stock: &mut BTreeMap<String, u32>,
    record: &mut ProgressionRecord,
) -> PurchaseOutcome {
    if !item.allow_multiple && record.owns(&item.id) {
        return PurchaseOutcome::AlreadyOwned;
    }

    let mut stock_taken = false;
    if item.initial_stock.is_some() {
        let remaining = stock.entry(item.id.clone()).or_insert(0);
        if *remaining == 0 {
            return PurchaseOutcome::OutOfStock;
        }
        *remaining -= 1;
        stock_taken = true;
    }

    if !ledger::spend_coins(record, item.price) {
        if stock_taken {
            // Compensate the stock decrement; the purchase never happened.
            *stock.entry(item.id.clone()).or_insert(0) += 1;
        }
        return PurchaseOutcome::InsufficientCoins {
            price: item.price,
            coins: record.coins,
        };
    }

    record.add_inventory(&item.id, 1);
    let equipped = item.system && equip_slot(item, record);
    PurchaseOutcome::Purchased {
        price: item.price,
        equipped,
    }
}

fn equip_slot(item: &StoreItem, record: &mut ProgressionRecord) -> bool {
    match item.kind {
        StoreItemKind::Theme => {
            record.active_theme = Some(item.id.clone());
            true
        }
        StoreItemKind::Frame => {
            record.active_frame = Some(item.id.clone());
            true
        }
        StoreItemKind::Perk => false,
    }
}

/// Outcome of using an owned item.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum UseOutcome {
    Equipped { slot: StoreItemKind },
    RedemptionRequested { redemption_id: String },
    NotOwned,
}

/// Use an owned item.
///
/// System items equip their slot and consume nothing. Non-system items are a
/// one-way action: one inventory unit is consumed at request time and a
/// pending redemption is filed with the owning teacher — the unit is spent
/// whether or not the teacher later approves.
pub fn apply_use(
    item: &StoreItem,
    record: &mut ProgressionRecord,
    redemptions: &mut BTreeMap<String, Redemption>,
    now: DateTime<Utc>,
) -> UseOutcome {
    if !record.owns(&item.id) {
        return UseOutcome::NotOwned;
    }

    if item.system {
        equip_slot(item, record);
        return UseOutcome::Equipped { slot: item.kind };
    }

    record.take_inventory(&item.id);
    let teacher_id = item.owner_id.clone().unwrap_or_default();
    let redemption = Redemption::new(record.student_id.clone(), item.id.clone(), teacher_id, now);
    let redemption_id = redemption.id.clone();
    redemptions.insert(redemption_id.clone(), redemption);
    UseOutcome::RedemptionRequested { redemption_id }
}

/// Outcome of a redemption review.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RedemptionReviewOutcome {
    Applied { status: RedemptionStatus },
    NotFound,
    NotPending { status: RedemptionStatus },
}

/// Resolve a pending redemption to its terminal state. Rejection does not
/// refund the consumed inventory unit.
pub fn review_redemption(
    redemptions: &mut BTreeMap<String, Redemption>,
    redemption_id: &str,
    approve: bool,
    now: DateTime<Utc>,
) -> RedemptionReviewOutcome {
    let Some(redemption) = redemptions.get_mut(redemption_id) else {
        return RedemptionReviewOutcome::NotFound;
    };
    if redemption.status != RedemptionStatus::Pending {
        return RedemptionReviewOutcome::NotPending {
            status: redemption.status,
        };
    }

    redemption.status = if approve {
        RedemptionStatus::Approved
    } else {
        RedemptionStatus::Rejected
    };
    redemption.reviewed_at = Some(now);
    RedemptionReviewOutcome::Applied {
        status: redemption.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme(id: &str, price: u64) -> StoreItem {
        StoreItem {
            id: id.to_string(),
            title: id.to_string(),
            price,
            kind: StoreItemKind::Theme,
            system: true,
            owner_id: None,
            initial_stock: None,
            allow_multiple: false,
        }
    }

    fn class_perk(id: &str, price: u64, stock: Option<u32>) -> StoreItem {
        StoreItem {
            id: id.to_string(),
            title: id.to_string(),
            price,
            kind: StoreItemKind::Perk,
            system: false,
            owner_id: Some("tch-1".to_string()),
            initial_stock: stock,
            allow_multiple: true,
        }
    }

    fn rich_record(coins: u64) -> ProgressionRecord {
        let mut record = ProgressionRecord::new("stu-1", Utc::now());
        record.coins = coins;
        record
    }

    #[test]
    fn catalog_merges_system_and_owner_scoped_items() {
        let catalog = ItemCatalog::new(vec![
            theme("theme-dark", 100),
            class_perk("homework-pass", 80, Some(5)),
            StoreItem {
                owner_id: Some("tch-2".to_string()),
                ..class_perk("other-class-pass", 80, None)
            },
        ])
        .unwrap();

        let visible: Vec<&str> = catalog
            .visible_to(Some("tch-1"))
            .iter()
            .map(|item| item.id.as_str())
            .collect();

        assert_eq!(visible, vec!["homework-pass", "theme-dark"]);
    }

    #[test]
    fn listing_computes_affordability_ownership_and_stock() {
        let catalog =
            ItemCatalog::new(vec![theme("theme-dark", 100), class_perk("pass", 80, Some(0))])
                .unwrap();
        let stock = catalog.initial_stock();
        let mut record = rich_record(90);
        record.add_inventory("theme-dark", 1);

        let entries = catalog_view(&catalog, &stock, &record, Some("tch-1"));

        let pass = entries.iter().find(|e| e.item.id == "pass").unwrap();
        assert!(pass.affordable);
        assert_eq!(pass.remaining_stock, Some(0));

        let dark = entries.iter().find(|e| e.item.id == "theme-dark").unwrap();
        assert!(!dark.affordable);
        assert!(dark.owned);
        assert_eq!(dark.remaining_stock, None);
    }

    #[test]
    fn purchase_beyond_balance_fails_and_restores_stock() {
        let item = class_perk("pass", 150, Some(3));
        let mut stock = BTreeMap::from([("pass".to_string(), 3)]);
        let mut record = rich_record(100);

        let outcome = apply_purchase(&item, &mut stock, &mut record);

        assert_eq!(
            outcome,
            PurchaseOutcome::InsufficientCoins {
                price: 150,
                coins: 100
            }
        );
        assert_eq!(record.coins, 100);
        assert_eq!(stock["pass"], 3);
        assert!(!record.owns("pass"));
    }

    #[test]
    fn purchase_at_zero_stock_always_fails() {
        let item = class_perk("pass", 10, Some(1));
        let mut stock = BTreeMap::from([("pass".to_string(), 1)]);
        let mut record = rich_record(100);

        assert!(matches!(
            apply_purchase(&item, &mut stock, &mut record),
            PurchaseOutcome::Purchased { .. }
        ));
        assert_eq!(stock["pass"], 0);

        let outcome = apply_purchase(&item, &mut stock, &mut record);
        assert_eq!(outcome, PurchaseOutcome::OutOfStock);
        assert_eq!(stock["pass"], 0);
        assert_eq!(record.coins, 90);
    }

    #[test]
    fn single_ownership_items_cannot_be_bought_twice() {
        let item = theme("theme-dark", 10);
        let mut stock = BTreeMap::new();
        let mut record = rich_record(100);

        let first = apply_purchase(&item, &mut stock, &mut record);
        assert_eq!(
            first,
            PurchaseOutcome::Purchased {
                price: 10,
                equipped: true
            }
        );
        assert_eq!(record.active_theme.as_deref(), Some("theme-dark"));

        assert_eq!(
            apply_purchase(&item, &mut stock, &mut record),
            PurchaseOutcome::AlreadyOwned
        );
        assert_eq!(record.coins, 90);
    }

    #[test]
    fn using_a_class_item_consumes_the_unit_and_files_a_pending_redemption() {
        let item = class_perk("pass", 10, None);
        let mut record = rich_record(0);
        record.add_inventory("pass", 1);
        let mut redemptions = BTreeMap::new();

        let outcome = apply_use(&item, &mut record, &mut redemptions, Utc::now());

        let UseOutcome::RedemptionRequested { redemption_id } = outcome else {
            panic!("expected redemption, got {outcome:?}");
        };
        assert!(!record.owns("pass"));
        let redemption = &redemptions[&redemption_id];
        assert_eq!(redemption.status, RedemptionStatus::Pending);
        assert_eq!(redemption.teacher_id, "tch-1");
    }

    #[test]
    fn rejection_is_terminal_and_does_not_refund() {
        let item = class_perk("pass", 10, None);
        let mut record = rich_record(0);
        record.add_inventory("pass", 1);
        let mut redemptions = BTreeMap::new();

        let UseOutcome::RedemptionRequested { redemption_id } =
            apply_use(&item, &mut record, &mut redemptions, Utc::now())
        else {
            panic!("expected redemption");
        };

        let outcome = review_redemption(&mut redemptions, &redemption_id, false, Utc::now());
        assert_eq!(
            outcome,
            RedemptionReviewOutcome::Applied {
                status: RedemptionStatus::Rejected
            }
        );
        assert!(!record.owns("pass"));

        // Terminal: a second decision is rejected.
        assert_eq!(
            review_redemption(&mut redemptions, &redemption_id, true, Utc::now()),
            RedemptionReviewOutcome::NotPending {
                status: RedemptionStatus::Rejected
            }
        );
    }

    #[test]
    fn using_a_system_item_equips_without_consuming() {
        let item = theme("theme-dark", 10);
        let mut record = rich_record(0);
        record.add_inventory("theme-dark", 1);
        let mut redemptions = BTreeMap::new();

        let outcome = apply_use(&item, &mut record, &mut redemptions, Utc::now());

        assert_eq!(
            outcome,
            UseOutcome::Equipped {
                slot: StoreItemKind::Theme
            }
        );
        assert!(record.owns("theme-dark"));
        assert!(redemptions.is_empty());
        assert_eq!(record.active_theme.as_deref(), Some("theme-dark"));
    }

    #[test]
    fn unowned_item_cannot_be_used() {
        let item = class_perk("pass", 10, None);
        let mut record = rich_record(0);
        let mut redemptions = BTreeMap::new();

        assert_eq!(
            apply_use(&item, &mut record, &mut redemptions, Utc::now()),
            UseOutcome::NotOwned
        );
        assert!(redemptions.is_empty());
    }
}
