use dropmart_core::SupplierId;

use crate::EventEnvelope;

/// Helper trait for supplier-scoped messages.
///
/// Marks types that carry an associated supplier ID, enabling supplier-aware
/// processing in infrastructure components (projection workers, filters).
/// A projection pinned to one supplier can reject envelopes from any other,
/// even if a buggy transport fans them out too widely.
pub trait SupplierScoped {
    fn supplier_id(&self) -> SupplierId;
}

impl<E> SupplierScoped for EventEnvelope<E> {
    fn supplier_id(&self) -> SupplierId {
        self.supplier_id()
    }
}
