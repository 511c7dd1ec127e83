//! Cleanup handles returned by every registration.

use crate::registry::{GroupKey, RegistrationId};
use crate::router::Inner;
use core::fmt;
use smallvec::SmallVec;
use std::rc::Weak;

/// One registration a cleanup handle can release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Registration {
    Delegated { group: GroupKey, id: RegistrationId },
    Direct(RegistrationId),
}

/// Removes the registration(s) it was returned for.
///
/// Idempotent: running it again, or after the router already dropped the
/// registration (leak sweep, `cleanup_all`), does nothing. Holds the router
/// weakly, so keeping a handle around never keeps the router alive.
#[derive(Clone)]
pub struct Cleanup {
    router: Weak<Inner>,
    registrations: SmallVec<Registration, 2>,
}

impl Cleanup {
    pub(crate) fn new(router: Weak<Inner>, registration: Registration) -> Self {
        let mut registrations = SmallVec::new();
        registrations.push(registration);
        Self {
            router,
            registrations,
        }
    }

    /// A handle releasing everything `self` and `other` release.
    pub(crate) fn merge(mut self, other: Self) -> Self {
        self.registrations.extend(other.registrations);
        self
    }

    pub fn run(&self) {
        let Some(router) = self.router.upgrade() else {
            return;
        };
        for registration in &self.registrations {
            router.release_handle(registration);
        }
    }

    /// True while at least one of the registrations is still live.
    pub fn is_active(&self) -> bool {
        self.router.upgrade().is_some_and(|router| {
            self.registrations
                .iter()
                .any(|registration| router.is_registered(registration))
        })
    }
}

impl PartialEq for Cleanup {
    fn eq(&self, other: &Self) -> bool {
        self.router.ptr_eq(&other.router) && self.registrations == other.registrations
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Cleanup")
            .field("registrations", &self.registrations)
            .field("active", &self.is_active())
            .finish()
    }
}
