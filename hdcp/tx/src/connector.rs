use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hdcp_core::{ContentProtection, TopologyInfo};

use crate::error::{HdcpError, HdcpResult};
use crate::link::LinkCheck;
use crate::session::Session;

/**
    An SRM handed over by the display configuration layer, identified by
    its blob id.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrmBlob {
    pub id: u32,
    pub data: Arc<[u8]>,
}

impl SrmBlob {
    pub fn new(id: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }
}

/**
    The part of a connector's configuration HDCP reacts to.
*/
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectorState {
    /// The connector drives an active output.
    pub active: bool,
    pub content_protection: ContentProtection,
    pub srm: Option<SrmBlob>,
}

struct LinkCheckTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    name: String,
    runtime: Handle,
    check_period: Duration,
    session: Mutex<Session>,
    property: watch::Sender<ContentProtection>,
    downstream: watch::Sender<Option<TopologyInfo>>,
    link_check: Mutex<Option<LinkCheckTask>>,
    /// Bumped by every explicit disable; enables scheduled before it are dropped.
    epoch: AtomicU64,
}

/**
    Runs one [`Session`] on a tokio runtime.

    Enable, the periodic link check and property sync are independent units
    of work. They only meet in the session mutex, so at most one of them
    drives the hardware at a time. Blocking register work runs on the
    runtime's blocking pool.

    The published content-protection value is a `watch` channel. Internal
    state is mirrored into it except that nothing overrides `Undesired`
    once a disable has gone through.
*/
#[derive(Clone)]
pub struct Connector {
    inner: Arc<Inner>,
}

impl Connector {
    pub fn new(session: Session, runtime: Handle) -> Self {
        let (property, _) = watch::channel(ContentProtection::Undesired);
        let (downstream, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                name: session.name().to_owned(),
                runtime,
                check_period: session.config().check_period,
                session: Mutex::new(session),
                property,
                downstream,
                link_check: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /**
        Published content-protection value.
    */
    pub fn content_protection(&self) -> ContentProtection {
        *self.inner.property.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ContentProtection> {
        self.inner.property.subscribe()
    }

    /**
        Topology of the last successful authentication, `None` while HDCP
        is off.
    */
    pub fn subscribe_downstream(&self) -> watch::Receiver<Option<TopologyInfo>> {
        self.inner.downstream.subscribe()
    }

    /**
        Internal session state. Blocks while a handshake is running.
    */
    pub fn state(&self) -> ContentProtection {
        self.inner.session.lock().value()
    }

    /**
        Ask for HDCP and schedule a handshake. Returns immediately.
    */
    pub fn enable(&self) {
        self.request_desired();
        self.inner.schedule_enable();
    }

    /**
        Ask for HDCP and wait for the handshake result.
    */
    pub async fn authenticate(&self) -> HdcpResult<()> {
        self.request_desired();
        let inner = Arc::clone(&self.inner);
        let epoch = inner.epoch.load(Ordering::SeqCst);
        join(self.inner.runtime.spawn_blocking(move || inner.run_enable(epoch))).await
    }

    /**
        Turn HDCP off. On return the hardware is disabled and no link
        check is running. Disabling twice is harmless.
    */
    pub async fn disable(&self) -> HdcpResult<()> {
        self.stop(ContentProtection::Undesired).await
    }

    /**
        Apply `blob` as the active SRM unless it is the one applied last.
    */
    pub async fn update_srm(&self, blob: &SrmBlob) -> bool {
        let inner = Arc::clone(&self.inner);
        let blob = blob.clone();
        join(self.inner.runtime.spawn_blocking(move || {
            Ok(inner.session.lock().update_srm(blob.id, &blob.data))
        }))
        .await
        .unwrap_or(false)
    }

    /**
        Adjust a requested state before it is committed: an output turned
        off while protected goes back to `Desired`, so protection comes
        back with the output.
    */
    pub fn check_state(old: &ConnectorState, new: &mut ConnectorState) {
        if !new.active && old.content_protection == ContentProtection::Enabled {
            new.content_protection = ContentProtection::Desired;
        }
    }

    /**
        Apply a committed state change: publish the requested value, tear
        HDCP down when the output goes away or protection is withdrawn, pick
        up a new SRM, and schedule a handshake when protection is wanted.
    */
    pub async fn commit(&self, old: &ConnectorState, new: &ConnectorState) -> HdcpResult<()> {
        use ContentProtection::{Desired, Undesired};

        let old_cp = old.content_protection;
        let new_cp = new.content_protection;
        let teardown = old_cp != Undesired && (!new.active || new_cp == Undesired);

        let result = if teardown {
            self.stop(new_cp).await
        } else {
            self.inner.property.send_replace(new_cp);
            Ok(())
        };

        if let Some(srm) = &new.srm {
            self.update_srm(srm).await;
        }

        if new.active && new_cp == Desired {
            self.inner.schedule_enable();
        }
        result
    }

    fn request_desired(&self) {
        self.inner.property.send_if_modified(|value| {
            if *value == ContentProtection::Undesired {
                *value = ContentProtection::Desired;
                true
            } else {
                false
            }
        });
    }

    async fn stop(&self, publish: ContentProtection) -> HdcpResult<()> {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let result = join(self.inner.runtime.spawn_blocking(move || {
            let mut session = inner.session.lock();
            let result = session.disable();
            inner.property.send_replace(publish);
            inner.downstream.send_replace(None);
            result
        }))
        .await;

        let task = self.inner.link_check.lock().take();
        if let Some(task) = task {
            task.token.cancel();
            if let Err(err) = task.handle.await {
                warn!(connector = %self.inner.name, error = %err, "link check task failed");
            }
        }
        result
    }
}

async fn join<T>(handle: JoinHandle<HdcpResult<T>>) -> HdcpResult<T> {
    match handle.await {
        Ok(result) => result,
        Err(err) => Err(HdcpError::TaskFailed(err.to_string())),
    }
}

impl Inner {
    fn schedule_enable(self: &Arc<Self>) {
        self.schedule_enable_at(self.epoch.load(Ordering::SeqCst));
    }

    /**
        Schedule an enable on behalf of work that started in `epoch`. A
        disable issued since then makes it a no-op.
    */
    fn schedule_enable_at(self: &Arc<Self>, epoch: u64) {
        let inner = Arc::clone(self);
        self.runtime.spawn_blocking(move || {
            // Failures are logged by the session; the published value stays put.
            let _ = inner.run_enable(epoch);
        });
    }

    fn run_enable(self: &Arc<Self>, epoch: u64) -> HdcpResult<()> {
        let mut session = self.session.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(connector = %self.name, "enable superseded by disable");
            return Ok(());
        }

        session.enable()?;
        self.downstream.send_replace(Some(session.topology().clone()));
        self.start_link_check(epoch);
        self.schedule_property_sync();
        Ok(())
    }

    /**
        Mirror the session state into the published property, unless the
        session has been disabled in the meantime.
    */
    fn schedule_property_sync(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.runtime.spawn_blocking(move || {
            let session = inner.session.lock();
            let value = session.value();
            if value != ContentProtection::Undesired {
                inner.property.send_replace(value);
            }
        });
    }

    fn start_link_check(self: &Arc<Self>, epoch: u64) {
        let mut slot = self.link_check.lock();
        if let Some(task) = slot.as_ref()
            && !task.token.is_cancelled()
            && !task.handle.is_finished()
        {
            return;
        }

        let token = CancellationToken::new();
        let handle = self
            .runtime
            .spawn(Arc::clone(self).link_check_loop(token.clone(), epoch));
        *slot = Some(LinkCheckTask { token, handle });
    }

    async fn link_check_loop(self: Arc<Self>, token: CancellationToken, epoch: u64) {
        let mut interval = tokio::time::interval_at(
            Instant::now() + self.check_period,
            self.check_period,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let inner = Arc::clone(&self);
            let check_token = token.clone();
            let keep_going = self
                .runtime
                .spawn_blocking(move || inner.run_link_check(&check_token, epoch))
                .await;
            match keep_going {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    error!(connector = %self.name, error = %err, "link check panicked");
                    token.cancel();
                    break;
                }
            }
        }
        debug!(connector = %self.name, "link check stopped");
    }

    /**
        One link check for a loop started in `epoch`. Once a disable has
        bumped the epoch the check stops without touching the hardware.
    */
    fn run_link_check(self: &Arc<Self>, token: &CancellationToken, epoch: u64) -> bool {
        let mut session = self.session.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            token.cancel();
            return false;
        }

        let outcome = session.check_link();
        let keep_going = outcome.keep_checking();
        if !keep_going {
            token.cancel();
        }

        match outcome {
            LinkCheck::Idle => {}
            LinkCheck::Healthy => self.schedule_property_sync(),
            LinkCheck::NotEncrypting => {
                info!(connector = %self.name, "link lost encryption, re-authenticating");
                self.schedule_property_sync();
                self.schedule_enable_at(epoch);
            }
            LinkCheck::Reauthenticated { .. } => {
                self.downstream.send_replace(Some(session.topology().clone()));
                self.schedule_property_sync();
            }
            LinkCheck::Failed(_) => {
                self.downstream.send_replace(None);
                self.schedule_property_sync();
            }
        }
        keep_going
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;

    use hdcp_core::{Bstatus, RevocationList};
    use hex_literal::hex;

    use crate::config::HdcpConfig;
    use crate::regs::{Port, Register};
    use crate::revocation::RevocationStore;
    use crate::sim::{SimReceiver, SimShim, SimTransmitter, sim_link};

    const WAIT: Duration = Duration::from_secs(5);

    fn connector(rx: SimReceiver, revoked: RevocationList) -> (Connector, SimTransmitter, SimShim) {
        let (tx, shim) = sim_link(Port::A, rx);
        let session = Session::new(
            "DP-1",
            Box::new(tx.clone()),
            Box::new(shim.clone()),
            Arc::new(RevocationStore::with_list(revoked)),
            HdcpConfig::fast(),
        )
        .unwrap();
        (Connector::new(session, Handle::current()), tx, shim)
    }

    async fn wait_for_value(connector: &Connector, value: ContentProtection) {
        let mut rx = connector.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|v| *v == value))
            .await
            .unwrap_or_else(|_| panic!("never reached {value}"))
            .unwrap();
    }

    async fn eventually<F, Fut>(what: &str, mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = Instant::now() + WAIT;
        while !check().await {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn enable_publishes_enabled_and_topology() {
        let (connector, _, _) = connector(
            SimReceiver::repeater(SimReceiver::downstream_ksvs(2)),
            RevocationList::default(),
        );
        let downstream = connector.subscribe_downstream();
        connector.enable();
        assert_eq!(connector.content_protection(), ContentProtection::Desired);

        wait_for_value(&connector, ContentProtection::Enabled).await;
        let topology = downstream.borrow().clone().unwrap();
        assert!(topology.is_repeater);
        assert_eq!(topology.ksv_list.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn zero_device_repeater_settles_at_desired() {
        let mut rx = SimReceiver::repeater(Vec::new());
        rx.bstatus = Some(Bstatus::new([0x00, 0x01]));
        let (connector, tx, _) = connector(rx, RevocationList::default());

        let err = connector.authenticate().await.unwrap_err();
        assert!(matches!(err, HdcpError::InvalidArgument(_)));
        assert_eq!(connector.content_protection(), ContentProtection::Desired);
        assert_eq!(connector.state(), ContentProtection::Undesired);
        assert_eq!(tx.writes_to(Register::ShaText), 0);
        assert!(connector.subscribe_downstream().borrow().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn revoked_downstream_ksv_is_denied() {
        let downstream = SimReceiver::downstream_ksvs(3);
        let revoked = RevocationList::new(vec![downstream[2]]);
        let (connector, tx, _) = connector(SimReceiver::repeater(downstream), revoked);

        let err = connector.authenticate().await.unwrap_err();
        assert!(matches!(err, HdcpError::PermissionDenied(_)));
        assert_eq!(tx.writes_to(Register::ShaText), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lost_encryption_demotes_and_reauthenticates() {
        let (connector, tx, _) = connector(SimReceiver::sink(), RevocationList::default());
        connector.authenticate().await.unwrap();
        wait_for_value(&connector, ContentProtection::Enabled).await;

        // Keep the new handshake from succeeding so the demotion stays visible.
        tx.script().an_stuck = true;
        tx.drop_encryption();

        wait_for_value(&connector, ContentProtection::Desired).await;
        eventually("re-authentication attempt", || {
            let tx = tx.clone();
            async move { tx.writes_to(Register::AnInit) > 2 }
        })
        .await;
        assert_eq!(connector.state(), ContentProtection::Desired);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lost_encryption_recovers() {
        let (connector, tx, shim) = connector(SimReceiver::sink(), RevocationList::default());
        connector.authenticate().await.unwrap();
        tx.drop_encryption();

        eventually("second handshake", || {
            let tx = tx.clone();
            async move { tx.writes_to(Register::AnInit) == 4 }
        })
        .await;
        wait_for_value(&connector, ContentProtection::Enabled).await;

        // a fresh periodic check is running again
        let checks = shim.link_checks();
        eventually("link checks to resume", || {
            let shim = shim.clone();
            async move { shim.link_checks() > checks }
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_link_check_reauthenticates() {
        let (connector, tx, shim) = connector(SimReceiver::sink(), RevocationList::default());
        connector.authenticate().await.unwrap();
        shim.fail_next_link_check();

        eventually("re-authentication", || {
            let tx = tx.clone();
            async move { tx.writes_to(Register::AnInit) == 4 }
        })
        .await;
        wait_for_value(&connector, ContentProtection::Enabled).await;
        assert_eq!(connector.state(), ContentProtection::Enabled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disable_twice_is_harmless() {
        let (connector, tx, shim) = connector(SimReceiver::sink(), RevocationList::default());
        connector.authenticate().await.unwrap();

        connector.disable().await.unwrap();
        connector.disable().await.unwrap();
        assert_eq!(connector.state(), ContentProtection::Undesired);
        assert_eq!(connector.content_protection(), ContentProtection::Undesired);
        assert!(!tx.encrypting());

        // no link check survives the disable
        let checks = shim.link_checks();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(shim.link_checks(), checks);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disable_wins_over_pending_enable() {
        let (connector, _, _) = connector(SimReceiver::sink(), RevocationList::default());
        connector.enable();
        connector.disable().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.content_protection(), ContentProtection::Undesired);
        assert_eq!(connector.state(), ContentProtection::Undesired);
    }

    async fn link_check_in(connector: &Connector, epoch: u64) -> bool {
        let inner = Arc::clone(&connector.inner);
        let token = CancellationToken::new();
        let check_token = token.clone();
        let keep_going = tokio::task::spawn_blocking(move || inner.run_link_check(&check_token, epoch))
            .await
            .unwrap();
        assert_eq!(keep_going, !token.is_cancelled());
        keep_going
    }

    async fn assert_stays_disabled(connector: &Connector, tx: &SimTransmitter) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.state(), ContentProtection::Undesired);
        assert_eq!(connector.content_protection(), ContentProtection::Undesired);
        assert!(connector.subscribe_downstream().borrow().is_none());
        assert!(!tx.encrypting());
    }

    // A check that gets the session lock after a disable has started must not
    // schedule a re-enable.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn link_check_yields_to_started_disable() {
        let (connector, tx, _) = connector(SimReceiver::sink(), RevocationList::default());
        connector.authenticate().await.unwrap();
        let epoch = connector.inner.epoch.load(Ordering::SeqCst);

        connector.inner.epoch.fetch_add(1, Ordering::SeqCst);
        tx.drop_encryption();
        assert!(!link_check_in(&connector, epoch).await);

        connector.disable().await.unwrap();
        assert_stays_disabled(&connector, &tx).await;
        assert_eq!(tx.writes_to(Register::AnInit), 2);
    }

    // A re-enable queued by a check just before the disable is dropped.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reenable_queued_before_disable_is_dropped() {
        let (connector, tx, _) = connector(SimReceiver::sink(), RevocationList::default());
        connector.authenticate().await.unwrap();
        let epoch = connector.inner.epoch.load(Ordering::SeqCst);

        tx.drop_encryption();
        assert!(!link_check_in(&connector, epoch).await);
        connector.disable().await.unwrap();

        assert_stays_disabled(&connector, &tx).await;
    }

    #[test]
    fn check_state_keeps_protection_wanted_across_output_off() {
        let old = ConnectorState {
            active: true,
            content_protection: ContentProtection::Enabled,
            srm: None,
        };
        let mut new = ConnectorState {
            active: false,
            ..old.clone()
        };
        Connector::check_state(&old, &mut new);
        assert_eq!(new.content_protection, ContentProtection::Desired);

        let mut unchanged = ConnectorState {
            active: true,
            ..old.clone()
        };
        Connector::check_state(&old, &mut unchanged);
        assert_eq!(unchanged.content_protection, ContentProtection::Enabled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commit_drives_the_session() {
        let rx = SimReceiver::sink();
        let bksv = rx.bksv();
        let (connector, _, _) = connector(rx, RevocationList::default());

        let off = ConnectorState::default();
        let wanted = ConnectorState {
            active: true,
            content_protection: ContentProtection::Desired,
            srm: None,
        };
        connector.commit(&off, &wanted).await.unwrap();
        wait_for_value(&connector, ContentProtection::Enabled).await;

        // output off while enabled: HDCP stops, request survives as Desired
        let enabled = ConnectorState {
            content_protection: ContentProtection::Enabled,
            ..wanted.clone()
        };
        let mut dark = ConnectorState {
            active: false,
            ..enabled.clone()
        };
        Connector::check_state(&enabled, &mut dark);
        connector.commit(&enabled, &dark).await.unwrap();
        assert_eq!(connector.state(), ContentProtection::Undesired);
        assert_eq!(connector.content_protection(), ContentProtection::Desired);

        // output back with an SRM revoking the sink: handshake is refused
        let mut blob = hex!("80 00 0002 01 000031 01").to_vec();
        blob.extend_from_slice(bksv.as_bytes());
        blob.extend_from_slice(&[0u8; 40]);
        let back = ConnectorState {
            srm: Some(SrmBlob::new(3, blob)),
            ..wanted.clone()
        };
        connector.commit(&dark, &back).await.unwrap();
        assert_eq!(connector.inner.session.lock().srm_blob_id(), Some(3));
        let err = connector.authenticate().await.unwrap_err();
        assert!(matches!(err, HdcpError::PermissionDenied(_)));

        // protection withdrawn
        let withdrawn = ConnectorState {
            content_protection: ContentProtection::Undesired,
            ..back.clone()
        };
        connector.commit(&back, &withdrawn).await.unwrap();
        assert_eq!(connector.content_protection(), ContentProtection::Undesired);
    }
}
