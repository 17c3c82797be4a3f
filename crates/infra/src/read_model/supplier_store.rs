use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use dropmart_core::SupplierId;

/// Supplier-isolated key/value store abstraction for disposable read models.
pub trait SupplierStore<K, V>: Send + Sync {
    fn get(&self, supplier_id: SupplierId, key: &K) -> Option<V>;
    fn upsert(&self, supplier_id: SupplierId, key: K, value: V);
    fn list(&self, supplier_id: SupplierId) -> Vec<V>;
    /// Clear all read-model records for a supplier (rebuild support).
    fn clear_supplier(&self, supplier_id: SupplierId);
}

impl<K, V, S> SupplierStore<K, V> for Arc<S>
where
    S: SupplierStore<K, V> + ?Sized,
{
    fn get(&self, supplier_id: SupplierId, key: &K) -> Option<V> {
        (**self).get(supplier_id, key)
    }

    fn upsert(&self, supplier_id: SupplierId, key: K, value: V) {
        (**self).upsert(supplier_id, key, value)
    }

    fn list(&self, supplier_id: SupplierId) -> Vec<V> {
        (**self).list(supplier_id)
    }

    fn clear_supplier(&self, supplier_id: SupplierId) {
        (**self).clear_supplier(supplier_id)
    }
}

/// In-memory supplier-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemorySupplierStore<K, V> {
    inner: RwLock<HashMap<(SupplierId, K), V>>,
}

impl<K, V> InMemorySupplierStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemorySupplierStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SupplierStore<K, V> for InMemorySupplierStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, supplier_id: SupplierId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(supplier_id, key.clone())).cloned()
    }

    fn upsert(&self, supplier_id: SupplierId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((supplier_id, key), value);
        }
    }

    fn list(&self, supplier_id: SupplierId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((s, _k), v)| if *s == supplier_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_supplier(&self, supplier_id: SupplierId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(s, _k), _v| *s != supplier_id);
        }
    }
}
