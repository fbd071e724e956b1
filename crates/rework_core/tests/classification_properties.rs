use std::collections::BTreeMap;

use proptest::prelude::*;
use proptest::test_runner::Config;
use time::macros::date;
use time::Duration;

use rework_core::config::EngineConfig;
use rework_core::domain::{ClassifiedRecord, GroupKey, RawServiceOrder};
use rework_core::engine::run_classification;
use rework_core::export::to_json_lines;
use rework_core::filter::{DateWindow, RecordFilter};
use rework_core::repo::InMemorySource;

const SERVICES: [&str; 4] = ["BRAKES", "AIR LEAK", "ENGINE", "DOORS"];

/// One order in a group's history, relative to the previous order's closing day.
#[derive(Debug, Clone)]
struct Visit {
    gap_days: i64,
    duration_days: i64,
    open_hour: i64,
    still_open: bool,
}

prop_compose! {
    fn visit()(
        gap_days in -2_i64..40,
        duration_days in 0_i64..4,
        open_hour in 6_i64..16,
        still_open in prop::bool::weighted(0.1),
    ) -> Visit {
        Visit { gap_days, duration_days, open_hour, still_open }
    }
}

prop_compose! {
    /// Orders for a handful of `(vehicle, service)` histories. A pair may be drawn
    /// more than once; its histories then interleave in one group.
    fn synthetic_orders()(
        histories in prop::collection::vec(
            (0_usize..6, 0_usize..SERVICES.len(), 0_i64..30, prop::collection::vec(visit(), 1..6)),
            1..12,
        ),
    ) -> Vec<RawServiceOrder> {
        let base = date!(2024 - 01 - 01);
        let mut out = Vec::new();
        for (vehicle, service, first_day, visits) in histories {
            let mut day = first_day;
            for v in visits {
                let opened = base + Duration::days(day);
                let closed = opened + Duration::days(v.duration_days);
                out.push(RawServiceOrder {
                    order_id: format!("OS-{:05}", out.len() + 1),
                    vehicle_id: format!("BUS-{vehicle:03}"),
                    service_code: SERVICES[service].to_string(),
                    order_type: Some("OFICINA".to_string()),
                    opened_at: Some(format!("{opened} {:02}:00:00", v.open_hour)),
                    closed_at: (!v.still_open).then(|| format!("{closed} 17:00:00")),
                    model: Some(["Urban", "Articulated"][vehicle % 2].to_string()),
                    ..Default::default()
                });
                day = (day + v.duration_days + v.gap_days).max(0);
            }
        }
        out
    }
}

fn filter() -> RecordFilter {
    RecordFilter::all(
        DateWindow::new(date!(2024 - 01 - 01), date!(2024 - 12 - 31)),
        "TODAS",
    )
}

fn run(orders: Vec<RawServiceOrder>, min_days: u32) -> Vec<ClassifiedRecord> {
    let source = InMemorySource::new(orders);
    run_classification(&source, &filter(), Some(min_days), &EngineConfig::default())
        .expect("classification")
        .records
}

fn by_group(records: &[ClassifiedRecord]) -> BTreeMap<GroupKey, Vec<&ClassifiedRecord>> {
    let mut out: BTreeMap<GroupKey, Vec<&ClassifiedRecord>> = BTreeMap::new();
    for rec in records {
        out.entry(rec.record.group_key()).or_default().push(rec);
    }
    out
}

fn min_days() -> impl Strategy<Value = u32> {
    prop::sample::select(vec![10_u32, 15, 20, 30])
}

proptest! {
    #![proptest_config(Config::with_cases(64))]

    #[test]
    fn every_record_is_exactly_one_of_rework_or_correction(
        orders in synthetic_orders(),
        min_days in min_days(),
    ) {
        let count = orders.len();
        let out = run(orders, min_days);
        prop_assert_eq!(out.len(), count);
        for rec in &out {
            prop_assert!(rec.is_rework ^ rec.is_correction, "{}", rec.record.order_id);
        }
    }

    #[test]
    fn rework_follows_the_inclusive_next_gap_threshold(
        orders in synthetic_orders(),
        min_days in min_days(),
    ) {
        let out = run(orders, min_days);
        for group in by_group(&out).values() {
            let last = group.last().expect("non-empty group");
            prop_assert!(!last.is_rework);
            prop_assert_eq!(last.next_gap_days, None);
        }
        for rec in &out {
            let expected = rec.next_gap_days.is_some_and(|g| g <= i64::from(min_days));
            prop_assert_eq!(rec.is_rework, expected, "{}", &rec.record.order_id);
            if rec.record.closed_at.is_none() {
                prop_assert!(!rec.is_rework, "{}", rec.record.order_id);
            }
        }
    }

    #[test]
    fn first_correction_needs_a_quiet_period_before_it(
        orders in synthetic_orders(),
        min_days in min_days(),
    ) {
        let out = run(orders, min_days);
        for rec in &out {
            let quiet_before = rec.prev_gap_days.map_or(true, |g| g > i64::from(min_days));
            prop_assert_eq!(
                rec.is_first_correction,
                rec.is_correction && quiet_before,
                "{}",
                &rec.record.order_id
            );
        }
    }

    #[test]
    fn episodes_advance_by_one_after_each_correction(
        orders in synthetic_orders(),
        min_days in min_days(),
    ) {
        let out = run(orders, min_days);
        for group in by_group(&out).values() {
            prop_assert_eq!(group[0].episode_no, 1);
            for pair in group.windows(2) {
                let step = u32::from(pair[0].is_correction);
                prop_assert_eq!(pair[1].episode_no, pair[0].episode_no + step);
            }
        }
    }

    #[test]
    fn input_order_does_not_change_the_output(
        orders in synthetic_orders(),
        min_days in min_days(),
    ) {
        let first = to_json_lines(&run(orders.clone(), min_days)).expect("json");
        let second = to_json_lines(&run(orders.clone(), min_days)).expect("json");
        prop_assert_eq!(&first, &second);

        let mut reversed = orders;
        reversed.reverse();
        let third = to_json_lines(&run(reversed, min_days)).expect("json");
        prop_assert_eq!(&first, &third);
    }

    #[test]
    fn editing_one_group_leaves_other_groups_untouched(
        orders in synthetic_orders(),
        min_days in min_days(),
    ) {
        let baseline = run(orders.clone(), min_days);
        let target = GroupKey {
            vehicle_id: orders[0].vehicle_id.clone(),
            service_code: orders[0].service_code.clone(),
        };

        let mut edited = orders
            .into_iter()
            .filter(|o| !(o.vehicle_id == target.vehicle_id && o.service_code == target.service_code))
            .collect::<Vec<_>>();
        edited.push(RawServiceOrder {
            order_id: "OS-EXTRA".to_string(),
            vehicle_id: target.vehicle_id.clone(),
            service_code: target.service_code.clone(),
            order_type: Some("OFICINA".to_string()),
            opened_at: Some("2024-06-01 08:00:00".to_string()),
            closed_at: Some("2024-06-02 08:00:00".to_string()),
            ..Default::default()
        });
        let changed = run(edited, min_days);

        let before = by_group(&baseline);
        let after = by_group(&changed);
        for (key, group) in &before {
            if *key == target {
                continue;
            }
            prop_assert_eq!(Some(group), after.get(key), "group {:?} changed", key);
        }
        prop_assert_eq!(after[&target].len(), 1);
    }
}
