use std::fmt::Debug;

use cpg_common::FiatAmount;
use log::*;

use crate::{
    api::{errors::PaymentFlowError, payment_objects::PaymentRequest},
    config::{BackendEntry, BackendRegistry},
    db_types::{NewPayment, Payment, PaymentId, PaymentStatus, SubjectRef},
    traits::{PaymentLedger, PaymentLedgerError},
};

/// `PaymentFlowApi` is the on-demand API for creating payments and serving the read path.
///
/// It orchestrates the payment factory: resolve the currency backend, convert the fiat amount, allocate a receiving
/// address (fresh derivation or reuse), and persist atomically. Underpayment children are created through the same
/// path with the parent's address forced.
pub struct PaymentFlowApi<B> {
    db: B,
    backends: BackendRegistry,
}

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B> PaymentFlowApi<B> {
    pub fn new(db: B, backends: BackendRegistry) -> Self {
        Self { db, backends }
    }
}

impl<B> PaymentFlowApi<B>
where B: PaymentLedger
{
    /// Creates a new payment for the request.
    ///
    /// * The currency must have an active, registered backend ([`PaymentFlowError::BackendUnavailable`] otherwise).
    /// * The fiat amount is converted at the current rate; a zero fiat amount creates the payment directly in `Paid`
    ///   (zero-value payments are trivially settled, e.g. comped invoices).
    /// * If `parent` is set, the parent's address is reused and the result is linked as its one child.
    /// * A duplicate-address race on fresh derivation is retried once with a re-read index before surfacing
    ///   [`PaymentFlowError::AllocationConflict`].
    pub async fn create_payment(&self, request: PaymentRequest) -> Result<Payment, PaymentFlowError> {
        let entry = self.backends.get(&request.currency)?;
        let cfg = entry.config();
        let crypto_amount = entry
            .adapter()
            .convert_from_fiat(request.fiat_amount, &request.fiat_currency)
            .await
            .map_err(PaymentFlowError::Conversion)?;
        let parent = match &request.parent {
            Some(pid) => {
                let parent = self
                    .db
                    .fetch_payment(pid)
                    .await?
                    .ok_or_else(|| PaymentFlowError::PaymentNotFound(pid.clone()))?;
                if parent.child_id.is_some() {
                    return Err(PaymentFlowError::AlreadyHasChild(parent.id));
                }
                Some(parent)
            },
            None => None,
        };
        let status = if request.fiat_amount.is_zero() { PaymentStatus::Paid } else { PaymentStatus::New };

        let mut retried = false;
        loop {
            let (address, reused) = match &parent {
                Some(p) => (p.address.clone(), true),
                None => self.resolve_address(&request, entry).await?,
            };
            let mut new_payment = NewPayment::new(
                cfg.currency.clone(),
                cfg.code.clone(),
                address,
                crypto_amount,
                request.fiat_amount,
                request.fiat_currency.clone(),
            );
            new_payment.address_reused = reused;
            new_payment.status = status;
            new_payment.title = request.title.clone();
            new_payment.description = request.description.clone();
            new_payment.owner = request.owner.clone();
            new_payment.subject = request.subject.clone();
            new_payment.parent_id = parent.as_ref().map(|p| p.id.clone());

            match self.db.insert_payment(new_payment).await {
                Ok(payment) => {
                    debug!("🏷️ Payment {} created at {} ({})", payment.id, payment.address, payment.status);
                    if let Some(p) = &parent {
                        self.db.link_child(&p.id, &payment.id).await.map_err(|e| match e {
                            PaymentLedgerError::ChildAlreadyLinked(id) => PaymentFlowError::AlreadyHasChild(id),
                            other => PaymentFlowError::Ledger(other),
                        })?;
                        debug!("🏷️ Payment {} linked as child of {}", payment.id, p.id);
                    }
                    return Ok(payment);
                },
                Err(PaymentLedgerError::DuplicateAddress(address)) => {
                    if retried || reused || request.address_index.is_some() {
                        return Err(PaymentFlowError::AllocationConflict(address));
                    }
                    warn!("🏷️ Address {address} was issued concurrently. Re-reading the index and retrying once.");
                    retried = true;
                },
                // A racing child creation that passed the has-child check loses at the insert itself.
                Err(PaymentLedgerError::ChildAlreadyLinked(id)) => return Err(PaymentFlowError::AlreadyHasChild(id)),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Creates the underpayment follow-up for `parent`, inheriting its currency, fiat currency, title, description,
    /// subject and owner, and reusing its address. The child starts its own independent lifecycle.
    pub async fn create_child_payment(
        &self,
        parent: &Payment,
        fiat_amount: FiatAmount,
    ) -> Result<Payment, PaymentFlowError> {
        let mut request = PaymentRequest::new(parent.currency.clone(), fiat_amount, parent.fiat_currency.clone())
            .with_parent(parent.id.clone());
        request.title = parent.title.clone();
        request.description = parent.description.clone();
        request.subject = parent.subject();
        request.owner = parent.owner.clone();
        self.create_payment(request).await
    }

    /// Resolves a receiving address for a non-child payment.
    ///
    /// An explicit index bypasses the reuse logic entirely. Otherwise, when reuse is requested (explicitly or by
    /// currency policy) the oldest-updated previously paid address is preferred; failing that, a fresh address is
    /// derived at index = number of payments ever created for the currency.
    async fn resolve_address(
        &self,
        request: &PaymentRequest,
        entry: &BackendEntry,
    ) -> Result<(String, bool), PaymentFlowError> {
        let cfg = entry.config();
        if let Some(index) = request.address_index {
            let address = entry
                .adapter()
                .derive_address(index, &cfg.address_type)
                .await
                .map_err(PaymentFlowError::Backend)?;
            return Ok((address, false));
        }
        if request.reuse_address.unwrap_or(cfg.reuse_address) {
            if let Some(address) = self.db.reusable_address(&cfg.currency).await? {
                trace!("🏷️ Reusing paid address {address} for a new {} payment", cfg.currency);
                return Ok((address, true));
            }
        }
        let index = self.db.payment_count(&cfg.currency).await?;
        let address =
            entry.adapter().derive_address(index, &cfg.address_type).await.map_err(PaymentFlowError::Backend)?;
        trace!("🏷️ Derived fresh address {address} at index {index} for {}", cfg.currency);
        Ok((address, false))
    }

    /// Fetches a payment by id, or [`PaymentFlowError::PaymentNotFound`].
    pub async fn fetch_payment(&self, id: &PaymentId) -> Result<Payment, PaymentFlowError> {
        self.db.fetch_payment(id).await?.ok_or_else(|| PaymentFlowError::PaymentNotFound(id.clone()))
    }

    /// The presentation-layer read path: a payment is visible when it has no owner and its currency allows anonymous
    /// viewing, or when the viewer is the owning principal. Anything else reads as absent rather than "forbidden",
    /// so an unauthorized probe cannot confirm a payment exists.
    pub async fn payment_for_viewer(
        &self,
        id: &PaymentId,
        viewer: Option<&str>,
    ) -> Result<Option<Payment>, PaymentFlowError> {
        let payment = match self.db.fetch_payment(id).await? {
            Some(p) => p,
            None => return Ok(None),
        };
        let visible = match (&payment.owner, viewer) {
            (Some(owner), Some(viewer)) => owner == viewer,
            (Some(_), None) => false,
            (None, _) => {
                self.backends.get(&payment.currency).map(|e| e.config().allow_anonymous_view).unwrap_or(false)
            },
        };
        Ok(visible.then_some(payment))
    }

    /// All payments recorded against the given external subject, oldest first.
    pub async fn payments_for_subject(&self, subject: &SubjectRef) -> Result<Vec<Payment>, PaymentFlowError> {
        Ok(self.db.payments_for_subject(subject).await?)
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
