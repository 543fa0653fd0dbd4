#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use strato_store::{
    Caller, Capability, Clock, DssResult, EntityId, EntityParams, FixedClock, Footprint, GeoPolygon,
    LatLng, NotifyFlags, OperationalIntentState, Orchestrator, OvnKey, PutEntityInput,
    PutSubscriptionInput, StoreConfig, StratoStore, SubscriptionBinding, SubscriptionId,
    Timestamp, Version, Volume4d,
};
use tempfile::{TempDir, tempdir};

pub const T0: Timestamp = Timestamp(1_760_000_000_000_000);
pub const HOUR: Duration = Duration::from_secs(3_600);
pub const USS_URL: &str = "https://uss.example/dss";

pub struct Harness {
    _dir: TempDir,
    pub store: StratoStore,
    pub clock: Arc<FixedClock>,
    pub dss: Orchestrator,
}

impl Harness {
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Window starting now and lasting `hours`.
    pub fn volume(&self, footprint: Footprint, hours: u32) -> Volume4d {
        let now = self.now();
        Volume4d::new(footprint, Some(now), Some(now.plus(HOUR * hours)))
    }
}

pub async fn harness() -> DssResult<Harness> {
    harness_with(|_| {}).await
}

pub async fn harness_with(configure: impl FnOnce(&mut StoreConfig)) -> DssResult<Harness> {
    let dir = tempdir().expect("tempdir");
    let mut config =
        StoreConfig::default_sqlite(dir.path().join("strato.sqlite").to_string_lossy());
    configure(&mut config);
    let store = StratoStore::connect(&config, dir.path()).await?;
    let clock = Arc::new(FixedClock::new(T0));
    let dss = store.orchestrator(clock.clone());
    Ok(Harness {
        _dir: dir,
        store,
        clock,
        dss,
    })
}

/// Axis-aligned box with its south-west corner at (`lat`, `lng`).
pub fn square(lat: f64, lng: f64, size_deg: f64) -> Footprint {
    Footprint::Polygon(GeoPolygon::new(vec![
        LatLng::new(lat, lng),
        LatLng::new(lat, lng + size_deg),
        LatLng::new(lat + size_deg, lng + size_deg),
        LatLng::new(lat + size_deg, lng),
    ]))
}

pub fn sion() -> Footprint {
    square(46.20, 7.40, 0.02)
}

/// Overlaps [`sion`] on its north-east quarter.
pub fn sion_east() -> Footprint {
    square(46.21, 7.41, 0.02)
}

/// Far enough from [`sion`] to share no cells.
pub fn zermatt() -> Footprint {
    square(46.00, 7.74, 0.02)
}

/// Strategic coordination plus every read scope, but not conformance monitoring.
pub fn operator(name: &str) -> Caller {
    Caller::new(
        name,
        [
            Capability::StrategicCoordination,
            Capability::ConstraintManagement,
            Capability::ConstraintProcessing,
            Capability::ServiceProvider,
            Capability::DisplayProvider,
        ],
    )
}

pub fn monitor(name: &str) -> Caller {
    Caller::new(
        name,
        [
            Capability::StrategicCoordination,
            Capability::ConformanceMonitoringForSituationalAwareness,
        ],
    )
}

pub fn intent(
    id: EntityId,
    extent: Volume4d,
    old_version: Option<Version>,
    state: OperationalIntentState,
    key: OvnKey,
    subscription: SubscriptionBinding,
) -> PutEntityInput {
    PutEntityInput {
        id,
        extent,
        old_version,
        params: EntityParams::OperationalIntent {
            uss_base_url: USS_URL.to_string(),
            state,
            key,
            subscription,
        },
    }
}

pub fn constraint(
    id: EntityId,
    extent: Volume4d,
    old_version: Option<Version>,
    subscription: SubscriptionBinding,
) -> PutEntityInput {
    PutEntityInput {
        id,
        extent,
        old_version,
        params: EntityParams::Constraint {
            uss_base_url: USS_URL.to_string(),
            subscription,
        },
    }
}

pub fn implicit(notify_for_constraints: bool) -> SubscriptionBinding {
    SubscriptionBinding::Implicit {
        base_url: USS_URL.to_string(),
        notify_for_constraints,
    }
}

pub fn subscription(
    id: SubscriptionId,
    extent: Volume4d,
    old_version: Option<Version>,
    notify: NotifyFlags,
) -> PutSubscriptionInput {
    PutSubscriptionInput {
        id,
        extent,
        old_version,
        callback_url: format!("{USS_URL}/notify"),
        notify,
    }
}

pub fn intents_only() -> NotifyFlags {
    NotifyFlags {
        operational_intents: true,
        constraints: false,
        service_areas: false,
    }
}

pub fn intents_and_constraints() -> NotifyFlags {
    NotifyFlags {
        operational_intents: true,
        constraints: true,
        service_areas: false,
    }
}
