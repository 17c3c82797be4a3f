//! Benchmarks of the write path: checkout splitting + reservation, and the
//! full delivery lifecycle. Streams grow as iterations accumulate, so these
//! also surface rehydration cost creep.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use rust_decimal::Decimal;
use uuid::Uuid;

use dropmart_core::{Actor, ResellerId, SupplierId};
use dropmart_infra::clock::FixedClock;
use dropmart_infra::services::ServiceSet;
use dropmart_orders::{CheckoutCart, CheckoutLine, ClientInfo, SubOrderStatus};

fn price(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn client() -> ClientInfo {
    ClientInfo {
        name: "Bench Client".to_string(),
        phone: "0550 00 00 00".to_string(),
        address: "Alger".to_string(),
    }
}

fn bench_services() -> ServiceSet {
    let clock = Arc::new(FixedClock::at(
        Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap(),
    ));
    ServiceSet::in_memory(clock)
}

fn checkout_benchmark(c: &mut Criterion) {
    let services = bench_services();
    let supplier_id = SupplierId::new();
    let product_id = services
        .catalog
        .define_product(
            supplier_id,
            "Bench Gadget".to_string(),
            price("40.00"),
            100_000_000,
            vec![],
        )
        .unwrap()
        .product_id;

    c.bench_function("checkout_single_supplier", |b| {
        b.iter(|| {
            services
                .checkout
                .checkout(CheckoutCart {
                    reseller_id: ResellerId::new(),
                    client: client(),
                    lines: vec![CheckoutLine {
                        product_id,
                        variation_id: None,
                        quantity: 1,
                        unit_sale_price: price("55.00"),
                    }],
                    delivery_fee: price("10.00"),
                    platform_fee: price("5.00"),
                })
                .unwrap()
        })
    });
}

fn lifecycle_benchmark(c: &mut Criterion) {
    let services = bench_services();
    let supplier_id = SupplierId::new();
    let product_id = services
        .catalog
        .define_product(
            supplier_id,
            "Bench Gadget".to_string(),
            price("40.00"),
            100_000_000,
            vec![],
        )
        .unwrap()
        .product_id;
    let actor = Actor::Supplier(supplier_id);

    c.bench_function("checkout_to_delivered_paid", |b| {
        b.iter(|| {
            let order = services
                .checkout
                .checkout(CheckoutCart {
                    reseller_id: ResellerId::new(),
                    client: client(),
                    lines: vec![CheckoutLine {
                        product_id,
                        variation_id: None,
                        quantity: 1,
                        unit_sale_price: price("55.00"),
                    }],
                    delivery_fee: price("10.00"),
                    platform_fee: price("5.00"),
                })
                .unwrap();

            let sub_order_id = order.sub_orders[0].sub_order_id;
            let mut version = services
                .fulfillment
                .get_sub_order(sub_order_id)
                .unwrap()
                .version;
            for status in [
                SubOrderStatus::InProgress,
                SubOrderStatus::ReadyForPickup,
                SubOrderStatus::Delivered,
                SubOrderStatus::DeliveredPaid,
            ] {
                version = services
                    .fulfillment
                    .transition(sub_order_id, status, actor, None, Uuid::now_v7(), version)
                    .unwrap()
                    .version;
            }
        })
    });
}

fn financials_benchmark(c: &mut Criterion) {
    let services = bench_services();
    let supplier_id = SupplierId::new();
    let product_id = services
        .catalog
        .define_product(
            supplier_id,
            "Bench Gadget".to_string(),
            price("40.00"),
            100_000_000,
            vec![],
        )
        .unwrap()
        .product_id;

    for _ in 0..500 {
        services
            .checkout
            .checkout(CheckoutCart {
                reseller_id: ResellerId::new(),
                client: client(),
                lines: vec![CheckoutLine {
                    product_id,
                    variation_id: None,
                    quantity: 1,
                    unit_sale_price: price("55.00"),
                }],
                delivery_fee: price("10.00"),
                platform_fee: price("5.00"),
            })
            .unwrap();
    }

    c.bench_function("financials_500_sub_orders", |b| {
        b.iter(|| {
            services
                .financials
                .get_financials(supplier_id, None, None)
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    checkout_benchmark,
    lifecycle_benchmark,
    financials_benchmark
);
criterion_main!(benches);
