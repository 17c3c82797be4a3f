use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dropmart_catalog::{ProductId, VariationId};
use dropmart_core::{DomainError, SupplierId};
use dropmart_orders::{ClientInfo, SubOrder, SubOrderId};

use crate::pickup::{Pickup, PickupId};

/// One printable line of a manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestLine {
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub quantity: i64,
    pub unit_sale_price: Decimal,
    pub line_total: Decimal,
}

/// One sub-order block of the manifest: who receives what, and the sub-total
/// the courier collects for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub sub_order_id: SubOrderId,
    pub client: ClientInfo,
    pub lines: Vec<ManifestLine>,
    pub sub_total: Decimal,
}

/// The printable courier handoff document — one per pickup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub pickup_id: PickupId,
    pub code: String,
    pub supplier_id: SupplierId,
    pub created_at: DateTime<Utc>,
    pub package_count: u32,
    pub total_weight_kg: Option<Decimal>,
    pub entries: Vec<ManifestEntry>,
    pub grand_total: Decimal,
}

impl Manifest {
    /// Assemble the manifest for `pickup` from the sub-orders it references.
    ///
    /// `sub_orders` must contain every member of the pickup (order does not
    /// matter); entries come out in the pickup's membership order.
    pub fn build(pickup: &Pickup, sub_orders: &[SubOrder]) -> Result<Manifest, DomainError> {
        let supplier_id = pickup
            .supplier_id()
            .ok_or_else(|| DomainError::validation("pickup has no supplier"))?;
        let created_at = pickup
            .created_at()
            .ok_or_else(|| DomainError::validation("pickup has no creation time"))?;

        let mut entries = Vec::with_capacity(pickup.sub_order_ids().len());
        for id in pickup.sub_order_ids() {
            let sub_order = sub_orders
                .iter()
                .find(|s| s.id_typed() == *id)
                .ok_or_else(|| {
                    DomainError::validation(format!("missing sub-order {id} for manifest"))
                })?;
            let client = sub_order
                .client()
                .cloned()
                .ok_or_else(|| DomainError::validation(format!("sub-order {id} has no client")))?;

            let lines = sub_order
                .lines()
                .iter()
                .map(|l| ManifestLine {
                    product_id: l.product_id,
                    variation_id: l.variation_id,
                    quantity: l.quantity,
                    unit_sale_price: l.unit_sale_price,
                    line_total: l.line_total(),
                })
                .collect();

            entries.push(ManifestEntry {
                sub_order_id: *id,
                client,
                lines,
                sub_total: sub_order.total(),
            });
        }

        let grand_total = entries.iter().map(|e| e.sub_total).sum();

        Ok(Manifest {
            pickup_id: pickup.id_typed(),
            code: pickup.code().to_string(),
            supplier_id,
            created_at,
            package_count: pickup.metadata().package_count,
            total_weight_kg: pickup.metadata().total_weight_kg,
            entries,
            grand_total,
        })
    }

    /// Plain-text rendering for thermal printers / PDF pipelines downstream.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("BORDEREAU D'ENLEVEMENT {}\n", self.code));
        out.push_str(&format!("Fournisseur: {}\n", self.supplier_id));
        out.push_str(&format!("Cree le: {}\n", self.created_at.format("%Y-%m-%d %H:%M")));
        out.push_str(&format!("Colis: {}", self.package_count));
        if let Some(w) = self.total_weight_kg {
            out.push_str(&format!("  Poids: {w} kg"));
        }
        out.push('\n');

        for entry in &self.entries {
            out.push_str("----------------------------------------\n");
            out.push_str(&format!("Sous-commande {}\n", entry.sub_order_id));
            out.push_str(&format!(
                "{} | {} | {}\n",
                entry.client.name, entry.client.phone, entry.client.address
            ));
            for line in &entry.lines {
                match line.variation_id {
                    Some(vid) => out.push_str(&format!(
                        "  {} ({vid}) x{} @ {} = {}\n",
                        line.product_id, line.quantity, line.unit_sale_price, line.line_total
                    )),
                    None => out.push_str(&format!(
                        "  {} x{} @ {} = {}\n",
                        line.product_id, line.quantity, line.unit_sale_price, line.line_total
                    )),
                }
            }
            out.push_str(&format!("  Sous-total: {}\n", entry.sub_total));
        }

        out.push_str("========================================\n");
        out.push_str(&format!("TOTAL: {}\n", self.grand_total));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropmart_core::{Actor, AggregateId, ResellerId};
    use dropmart_events::execute;
    use dropmart_orders::{OpenSubOrder, OrderId, SubOrderCommand, SubOrderLine};
    use crate::pickup::{OpenPickup, PickupCommand, PickupMetadata};

    fn price(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn opened_sub_order(supplier_id: SupplierId, total_price: &str) -> SubOrder {
        let sub_order_id = SubOrderId::new(AggregateId::new());
        let mut sub_order = SubOrder::empty(sub_order_id);
        execute(
            &mut sub_order,
            &SubOrderCommand::OpenSubOrder(OpenSubOrder {
                supplier_id,
                sub_order_id,
                order_id: OrderId::new(AggregateId::new()),
                reseller_id: ResellerId::new(),
                client: ClientInfo {
                    name: "Sara K.".to_string(),
                    phone: "0661 00 11 22".to_string(),
                    address: "Oran".to_string(),
                },
                lines: vec![SubOrderLine {
                    product_id: ProductId::new(AggregateId::new()),
                    variation_id: None,
                    quantity: 1,
                    unit_sale_price: price(total_price),
                    unit_wholesale_price: price("10.00"),
                }],
                delivery_fee: Decimal::ZERO,
                platform_fee: Decimal::ZERO,
                actor: Actor::Reseller(ResellerId::new()),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        sub_order
    }

    #[test]
    fn manifest_totals_sum_across_entries() {
        let supplier_id = SupplierId::new();
        let a = opened_sub_order(supplier_id, "50.00");
        let b = opened_sub_order(supplier_id, "70.00");

        let pickup_id = PickupId::new(AggregateId::new());
        let mut pickup = Pickup::empty(pickup_id);
        execute(
            &mut pickup,
            &PickupCommand::OpenPickup(OpenPickup {
                supplier_id,
                pickup_id,
                code: "PU-000001".to_string(),
                metadata: PickupMetadata {
                    package_count: 2,
                    total_weight_kg: None,
                },
                sub_order_ids: vec![a.id_typed(), b.id_typed()],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let manifest = Manifest::build(&pickup, &[b.clone(), a.clone()]).unwrap();
        assert_eq!(manifest.entries.len(), 2);
        // Entries follow the pickup's membership order, not input order.
        assert_eq!(manifest.entries[0].sub_order_id, a.id_typed());
        assert_eq!(manifest.grand_total, price("120.00"));

        let text = manifest.to_plain_text();
        assert!(text.contains("PU-000001"));
        assert!(text.contains("Sara K."));
    }

    #[test]
    fn missing_sub_order_fails_the_build() {
        let supplier_id = SupplierId::new();
        let a = opened_sub_order(supplier_id, "50.00");

        let pickup_id = PickupId::new(AggregateId::new());
        let mut pickup = Pickup::empty(pickup_id);
        execute(
            &mut pickup,
            &PickupCommand::OpenPickup(OpenPickup {
                supplier_id,
                pickup_id,
                code: "PU-000002".to_string(),
                metadata: PickupMetadata {
                    package_count: 1,
                    total_weight_kg: None,
                },
                sub_order_ids: vec![a.id_typed()],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let err = Manifest::build(&pickup, &[]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
