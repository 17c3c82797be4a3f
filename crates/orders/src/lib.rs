//! Orders domain module (event-sourced).
//!
//! Cart-level types consumed by the checkout splitter, plus the `SubOrder`
//! aggregate: the delivery-lifecycle state machine whose event stream is the
//! append-only tracking history. Pure domain logic — no IO, no storage.

pub mod cart;
pub mod sub_order;

pub use cart::{CheckoutCart, CheckoutLine, ClientInfo, Order, OrderId, SubOrderSummary};
pub use sub_order::{
    OpenSubOrder, RecordTransition, SUB_ORDER_AGGREGATE_TYPE, StatusRecorded, SubOrder,
    SubOrderCommand, SubOrderEvent, SubOrderId, SubOrderLine, SubOrderOpened, SubOrderStatus,
    TrackingEntry, TransitionRule, transition_rule,
};
