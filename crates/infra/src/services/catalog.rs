use std::sync::Arc;

use rust_decimal::Decimal;

use dropmart_catalog::{
    DefineProduct, PRODUCT_AGGREGATE_TYPE, Product, ProductCommand, ProductId, ReplenishStock,
    VariationId, VariationSpec,
};
use dropmart_core::{AggregateId, SupplierId};

use crate::clock::Clock;
use crate::command_dispatcher::DispatchError;
use crate::projections::{ProductStockLevels, ProjectionSet};
use crate::services::{MAX_CONFLICT_RETRIES, SharedDispatcher, with_conflict_retry};

/// Catalog management: seeding products and restocking counters.
///
/// Thin — the stock ledger semantics live in the product aggregate; this is
/// the dispatch plumbing suppliers use before checkout can reserve anything.
pub struct CatalogService {
    dispatcher: Arc<SharedDispatcher>,
    projections: Arc<ProjectionSet>,
    clock: Arc<dyn Clock>,
}

impl CatalogService {
    pub fn new(
        dispatcher: Arc<SharedDispatcher>,
        projections: Arc<ProjectionSet>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            projections,
            clock,
        }
    }

    pub fn define_product(
        &self,
        supplier_id: SupplierId,
        name: String,
        wholesale_price: Decimal,
        initial_stock: i64,
        variations: Vec<VariationSpec>,
    ) -> Result<ProductStockLevels, DispatchError> {
        let product_id = ProductId::new(AggregateId::new());
        let cmd = ProductCommand::DefineProduct(DefineProduct {
            supplier_id,
            product_id,
            name,
            wholesale_price,
            initial_stock,
            variations,
            occurred_at: self.clock.now(),
        });

        let committed = self.dispatcher.dispatch::<Product>(
            supplier_id,
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            cmd,
            |_, aggregate_id| Product::empty(ProductId::new(aggregate_id)),
        )?;
        for stored in &committed {
            self.projections.apply(&stored.to_envelope());
        }

        self.projections
            .stock_levels
            .find(product_id)
            .ok_or(DispatchError::NotFound)
    }

    pub fn replenish(
        &self,
        product_id: ProductId,
        variation_id: Option<VariationId>,
        quantity: i64,
    ) -> Result<ProductStockLevels, DispatchError> {
        let supplier_id = self
            .projections
            .stock_levels
            .supplier_of(product_id)
            .ok_or(DispatchError::NotFound)?;

        let now = self.clock.now();
        let committed = with_conflict_retry(MAX_CONFLICT_RETRIES, || {
            self.dispatcher.dispatch::<Product>(
                supplier_id,
                product_id.0,
                PRODUCT_AGGREGATE_TYPE,
                ProductCommand::ReplenishStock(ReplenishStock {
                    supplier_id,
                    product_id,
                    variation_id,
                    quantity,
                    occurred_at: now,
                }),
                |_, aggregate_id| Product::empty(ProductId::new(aggregate_id)),
            )
        })?;
        for stored in &committed {
            self.projections.apply(&stored.to_envelope());
        }

        self.projections
            .stock_levels
            .find(product_id)
            .ok_or(DispatchError::NotFound)
    }

    pub fn stock_levels(&self, product_id: ProductId) -> Option<ProductStockLevels> {
        self.projections.stock_levels.find(product_id)
    }
}
