use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crate::{Error, HighSegmentProvider, Layout, Result, Wuid, mutex::lock};

impl<L: Layout> Wuid<L> {
    /// Binds `provider` as the renewal action unless one is already bound.
    pub(crate) fn bind(&self, provider: Arc<dyn HighSegmentProvider>) -> Result<()> {
        let mut renew = lock(&self.shared.renew)?;
        if renew.is_some() {
            tracing::debug!(name = %self.shared.name, "<wuid> renewal already bound, keeping it");
            return Ok(());
        }
        *renew = Some(provider);
        Ok(())
    }

    /// Renews the high segment on the calling thread.
    ///
    /// The bound provider is read under the renewal lock, but called outside
    /// of it, so a slow store never blocks other renewals.
    ///
    /// # Errors
    ///
    /// - [`Error::NotBound`] if no provider has been loaded yet
    /// - whatever the provider or [`Self::verify`] reports
    pub fn renew_now(&self) -> Result<()> {
        let provider = lock(&self.shared.renew)?
            .as_ref()
            .map(Arc::clone)
            .ok_or(Error::NotBound)?;
        self.load_once(provider.as_ref()).map(|_| ())
    }

    /// Runs one renewal on a detached thread.
    #[cold]
    #[inline(never)]
    pub(crate) fn schedule_renewal(&self) {
        let generator = self.clone();
        let spawned = thread::Builder::new()
            .name("wuid-renew".into())
            .spawn(move || generator.renew_in_background());

        if let Err(err) = spawned {
            self.shared.counters.record_attempt();
            tracing::warn!(name = %self.shared.name, error = %err, "<wuid> renew failed, could not spawn");
        }
    }

    /// Counts the attempt, renews, and turns any failure, including a
    /// panicking provider, into a log event.
    pub(crate) fn renew_in_background(&self) {
        let shared = &*self.shared;
        shared.counters.record_attempt();

        match panic::catch_unwind(AssertUnwindSafe(|| self.renew_now())) {
            Ok(Ok(())) => {
                shared.counters.record_renewal();
                tracing::info!(name = %shared.name, "<wuid> renew succeeded");
            }
            Ok(Err(err)) => {
                tracing::warn!(name = %shared.name, error = %err, "<wuid> renew failed");
            }
            Err(payload) => {
                tracing::warn!(
                    name = %shared.name,
                    reason = panic_message(payload.as_ref()),
                    "<wuid> panic, renew failed"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown"
    }
}
