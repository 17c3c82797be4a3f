use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use dropmart_catalog::{
    PRODUCT_AGGREGATE_TYPE, Product, ProductCommand, ProductId, ReleaseStock, ReserveStock,
    VariationId,
};
use dropmart_core::{Actor, AggregateId, SupplierId};
use dropmart_orders::{
    CheckoutCart, CheckoutLine, OpenSubOrder, Order, OrderId, SUB_ORDER_AGGREGATE_TYPE, SubOrder,
    SubOrderCommand, SubOrderId, SubOrderLine, SubOrderSummary,
};

use crate::clock::Clock;
use crate::command_dispatcher::{DispatchError, rehydrate};
use crate::event_store::StoredEvent;
use crate::projections::ProjectionSet;
use crate::services::{MAX_CONFLICT_RETRIES, SharedDispatcher, SharedStore, with_conflict_retry};

/// The order splitter: one reseller checkout in, N supplier-scoped
/// sub-orders out, stock reserved for every line or for none.
///
/// The flow is reserve-all-then-open-all with compensation: reservations are
/// taken line by line, and the first failure releases everything already
/// taken in this checkout before the error (naming the offending
/// product/variation) is returned. Sub-order streams are only opened once
/// every reservation is held.
pub struct CheckoutService {
    dispatcher: Arc<SharedDispatcher>,
    store: SharedStore,
    projections: Arc<ProjectionSet>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
struct EnrichedLine {
    line: CheckoutLine,
    unit_wholesale_price: Decimal,
}

#[derive(Debug, Clone)]
struct ReservationRecord {
    supplier_id: SupplierId,
    product_id: ProductId,
    variation_id: Option<VariationId>,
    quantity: i64,
    reference: AggregateId,
}

impl CheckoutService {
    pub fn new(
        dispatcher: Arc<SharedDispatcher>,
        store: SharedStore,
        projections: Arc<ProjectionSet>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            projections,
            clock,
        }
    }

    pub fn checkout(&self, cart: CheckoutCart) -> Result<Order, DispatchError> {
        cart.validate()?;
        let now = self.clock.now();

        let groups = self.split_by_supplier(&cart)?;

        let order_id = OrderId::new(AggregateId::new());
        let sub_order_ids: BTreeMap<SupplierId, SubOrderId> = groups
            .keys()
            .map(|supplier_id| (*supplier_id, SubOrderId::new(AggregateId::new())))
            .collect();

        // Phase 1: reserve every line, releasing everything on first failure.
        let mut reserved: Vec<ReservationRecord> = Vec::new();
        for (supplier_id, lines) in &groups {
            let reference = sub_order_ids[supplier_id].0;
            for enriched in lines {
                match self.reserve_line(*supplier_id, enriched, reference, now) {
                    Ok(record) => reserved.push(record),
                    Err(err) => {
                        tracing::warn!(
                            supplier_id = %supplier_id,
                            product_id = %enriched.line.product_id,
                            "checkout reservation failed, rolling back"
                        );
                        self.release_reservations(&reserved, now);
                        return Err(err);
                    }
                }
            }
        }

        // Phase 2: open one sub-order per supplier.
        let mut summaries: Vec<SubOrderSummary> = Vec::new();
        let mut opened: Vec<SupplierId> = Vec::new();
        for (supplier_id, lines) in &groups {
            let sub_order_id = sub_order_ids[supplier_id];
            let sub_order_lines: Vec<SubOrderLine> = lines
                .iter()
                .map(|enriched| SubOrderLine {
                    product_id: enriched.line.product_id,
                    variation_id: enriched.line.variation_id,
                    quantity: enriched.line.quantity,
                    unit_sale_price: enriched.line.unit_sale_price,
                    unit_wholesale_price: enriched.unit_wholesale_price,
                })
                .collect();
            let total = sub_order_lines
                .iter()
                .map(|l| l.line_total())
                .sum::<Decimal>()
                + cart.delivery_fee;

            let cmd = SubOrderCommand::OpenSubOrder(OpenSubOrder {
                supplier_id: *supplier_id,
                sub_order_id,
                order_id,
                reseller_id: cart.reseller_id,
                client: cart.client.clone(),
                lines: sub_order_lines,
                delivery_fee: cart.delivery_fee,
                platform_fee: cart.platform_fee,
                actor: Actor::Reseller(cart.reseller_id),
                occurred_at: now,
            });

            match self.dispatcher.dispatch::<SubOrder>(
                *supplier_id,
                sub_order_id.0,
                SUB_ORDER_AGGREGATE_TYPE,
                cmd,
                |_, aggregate_id| SubOrder::empty(SubOrderId::new(aggregate_id)),
            ) {
                Ok(committed) => {
                    self.apply_committed(&committed);
                    opened.push(*supplier_id);
                    summaries.push(SubOrderSummary {
                        sub_order_id,
                        supplier_id: *supplier_id,
                        total,
                    });
                }
                Err(err) => {
                    // Cannot happen on splitter-validated input; if a fresh
                    // stream still refuses the open, give back the stock held
                    // for every sub-order not yet opened.
                    tracing::error!(
                        supplier_id = %supplier_id,
                        error = ?err,
                        "sub-order open failed after reservations"
                    );
                    let pending: Vec<ReservationRecord> = reserved
                        .iter()
                        .filter(|r| !opened.contains(&r.supplier_id))
                        .cloned()
                        .collect();
                    self.release_reservations(&pending, now);
                    return Err(err);
                }
            }
        }

        tracing::info!(
            order_id = %order_id,
            sub_orders = summaries.len(),
            "checkout committed"
        );

        Ok(Order {
            id: order_id,
            reseller_id: cart.reseller_id,
            client: cart.client.clone(),
            created_at: now,
            sub_orders: summaries,
        })
    }

    /// Resolve cart lines against the catalog and group them by supplier.
    fn split_by_supplier(
        &self,
        cart: &CheckoutCart,
    ) -> Result<BTreeMap<SupplierId, Vec<EnrichedLine>>, DispatchError> {
        let mut cache: HashMap<ProductId, (SupplierId, Product)> = HashMap::new();
        let mut groups: BTreeMap<SupplierId, Vec<EnrichedLine>> = BTreeMap::new();

        for line in &cart.lines {
            if !cache.contains_key(&line.product_id) {
                let supplier_id = self
                    .projections
                    .stock_levels
                    .supplier_of(line.product_id)
                    .ok_or_else(|| {
                        DispatchError::Validation(format!("unknown product {}", line.product_id))
                    })?;
                let (product, _) = rehydrate::<_, Product>(
                    &self.store,
                    supplier_id,
                    line.product_id.0,
                    |_, aggregate_id| Product::empty(ProductId::new(aggregate_id)),
                )?;
                if !product.exists() {
                    return Err(DispatchError::Validation(format!(
                        "unknown product {}",
                        line.product_id
                    )));
                }
                cache.insert(line.product_id, (supplier_id, product));
            }

            let (supplier_id, product) = &cache[&line.product_id];
            let unit_wholesale_price = product
                .wholesale_price_for(line.variation_id)
                .ok_or_else(|| match line.variation_id {
                    Some(vid) => DispatchError::Validation(format!(
                        "unknown variation {vid} for product {}",
                        line.product_id
                    )),
                    None => DispatchError::Validation(format!(
                        "product {} has variations; a variation_id is required",
                        line.product_id
                    )),
                })?;

            groups.entry(*supplier_id).or_default().push(EnrichedLine {
                line: line.clone(),
                unit_wholesale_price,
            });
        }

        Ok(groups)
    }

    fn reserve_line(
        &self,
        supplier_id: SupplierId,
        enriched: &EnrichedLine,
        reference: AggregateId,
        now: DateTime<Utc>,
    ) -> Result<ReservationRecord, DispatchError> {
        let line = &enriched.line;
        let committed = with_conflict_retry(MAX_CONFLICT_RETRIES, || {
            self.dispatcher.dispatch::<Product>(
                supplier_id,
                line.product_id.0,
                PRODUCT_AGGREGATE_TYPE,
                ProductCommand::ReserveStock(ReserveStock {
                    supplier_id,
                    product_id: line.product_id,
                    variation_id: line.variation_id,
                    quantity: line.quantity,
                    reference,
                    occurred_at: now,
                }),
                |_, aggregate_id| Product::empty(ProductId::new(aggregate_id)),
            )
        })?;
        self.apply_committed(&committed);

        Ok(ReservationRecord {
            supplier_id,
            product_id: line.product_id,
            variation_id: line.variation_id,
            quantity: line.quantity,
            reference,
        })
    }

    /// Compensation: return every reservation of a failed checkout.
    ///
    /// Releases are idempotent no-ops once the reservation is gone, so this
    /// is safe to run even if a retry already released part of the set.
    fn release_reservations(&self, records: &[ReservationRecord], now: DateTime<Utc>) {
        for record in records {
            let result = with_conflict_retry(MAX_CONFLICT_RETRIES, || {
                self.dispatcher.dispatch::<Product>(
                    record.supplier_id,
                    record.product_id.0,
                    PRODUCT_AGGREGATE_TYPE,
                    ProductCommand::ReleaseStock(ReleaseStock {
                        supplier_id: record.supplier_id,
                        product_id: record.product_id,
                        variation_id: record.variation_id,
                        quantity: record.quantity,
                        reference: record.reference,
                        occurred_at: now,
                    }),
                    |_, aggregate_id| Product::empty(ProductId::new(aggregate_id)),
                )
            });
            match result {
                Ok(committed) => self.apply_committed(&committed),
                Err(err) => {
                    // The reservation stays open on the product aggregate and
                    // remains visible for an integrity sweep.
                    tracing::error!(
                        product_id = %record.product_id,
                        error = ?err,
                        "failed to compensate reservation"
                    );
                }
            }
        }
    }

    fn apply_committed(&self, committed: &[StoredEvent]) {
        for stored in committed {
            self.projections.apply(&stored.to_envelope());
        }
    }
}
