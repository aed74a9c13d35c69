//! Order state machine.
//!
//! Every way an order can change is a [`Trigger`]. [`plan`] looks the trigger
//! up against the order's current [`OrderState`] and returns either the next
//! status together with the complete list of side effects, an explicit
//! [`Plan::Ignore`] for replays and stale gateway notifications, or an
//! [`OrderError::InvalidTransition`]. Nothing else in the crate decides which
//! side effects a transition has.
//!
//! ```text
//! PENDING -> CONFIRMED -> PROCESSING -> SHIPPED -> OUT_FOR_DELIVERY -> DELIVERED
//! PENDING | CONFIRMED -> CANCELLED
//! ```
//!
//! Payment runs on its own axis: `PENDING -> PAID | FAILED`, `PAID -> REFUNDED`.

use crate::domain::aggregates::order::{OrderError, OrderStatus, PaymentMethod, PaymentStatus, Settlement};

/// What happened to the order.
#[derive(Clone, Debug, PartialEq)]
pub enum Trigger {
    /// Customer (or admin) cancellation.
    Cancel,
    /// Privileged status update to the given status.
    Advance(OrderStatus),
    /// Gateway captured funds for the order's payment.
    PaymentCaptured(Settlement),
    /// Gateway reported the payment as failed.
    PaymentFailed,
    /// Gateway reported the remote order as paid.
    GatewayOrderPaid,
}

/// A side effect attached to a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Put every line item's quantity back into stock.
    ReleaseStock,
    /// Record that a gateway payment must be refunded.
    FlagRefund,
    MarkPaid,
    MarkPaymentFailed,
    RecordSettlement,
    StampConfirmed,
    StampShipped,
    StampDelivered,
    StampCancelled,
}

/// The parts of an order the table looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderState {
    pub status: OrderStatus,
    pub payment: PaymentStatus,
    pub method: PaymentMethod,
    pub settled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plan {
    Apply { to: OrderStatus, effects: Vec<Effect> },
    Ignore(&'static str),
}

pub fn plan(state: OrderState, trigger: &Trigger) -> Result<Plan, OrderError> {
    use Effect::*;
    use OrderStatus as S;
    use PaymentStatus as P;

    let invalid = |to: OrderStatus| Err(OrderError::InvalidTransition { from: state.status, to });

    match trigger {
        Trigger::Cancel | Trigger::Advance(S::Cancelled) => {
            if !state.status.is_cancellable() { return invalid(S::Cancelled); }
            let mut effects = vec![ReleaseStock, StampCancelled];
            if state.method == PaymentMethod::Razorpay && state.payment == P::Paid { effects.push(FlagRefund); }
            Ok(Plan::Apply { to: S::Cancelled, effects })
        }
        // Re-applying the current status amends tracking or notes without restamping.
        Trigger::Advance(target) if *target == state.status => {
            if state.status.is_terminal() { return invalid(*target); }
            Ok(Plan::Apply { to: *target, effects: vec![] })
        }
        Trigger::Advance(target) => {
            let forward = match (state.status.rank(), target.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            };
            if !forward { return invalid(*target); }
            let effects = match target {
                S::Confirmed => vec![StampConfirmed],
                S::Shipped => vec![StampShipped],
                S::Delivered => vec![StampDelivered],
                _ => vec![],
            };
            Ok(Plan::Apply { to: *target, effects })
        }
        Trigger::PaymentCaptured(_) => match state.payment {
            P::Pending => Ok(Plan::Apply { to: state.status, effects: vec![MarkPaid, RecordSettlement] }),
            P::Paid if !state.settled => Ok(Plan::Apply { to: state.status, effects: vec![RecordSettlement] }),
            P::Paid => Ok(Plan::Ignore("settlement already recorded")),
            P::Failed | P::Refunded => Ok(Plan::Ignore("payment already closed")),
        },
        Trigger::PaymentFailed => match (state.payment, state.status) {
            (P::Pending, s) if s.is_cancellable() => Ok(Plan::Apply { to: S::Cancelled, effects: vec![MarkPaymentFailed, ReleaseStock, StampCancelled] }),
            (P::Pending, s) => Ok(Plan::Apply { to: s, effects: vec![MarkPaymentFailed] }),
            (P::Failed, _) => Ok(Plan::Ignore("payment failure already recorded")),
            (P::Paid | P::Refunded, _) => Ok(Plan::Ignore("payment already settled")),
        },
        Trigger::GatewayOrderPaid => match state.status {
            S::Pending => Ok(Plan::Apply { to: S::Confirmed, effects: vec![StampConfirmed] }),
            _ => Ok(Plan::Ignore("order already past confirmation")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus as S;
    use PaymentStatus as P;

    fn state(status: OrderStatus, payment: PaymentStatus, method: PaymentMethod) -> OrderState {
        OrderState { status, payment, method, settled: false }
    }

    #[test]
    fn test_cancel_only_from_pending_or_confirmed() {
        for status in [S::Pending, S::Confirmed] {
            assert!(matches!(plan(state(status, P::Pending, PaymentMethod::Cod), &Trigger::Cancel), Ok(Plan::Apply { to: S::Cancelled, .. })));
        }
        for status in [S::Processing, S::Shipped, S::OutForDelivery, S::Delivered, S::Cancelled] {
            assert_eq!(
                plan(state(status, P::Pending, PaymentMethod::Cod), &Trigger::Cancel),
                Err(OrderError::InvalidTransition { from: status, to: S::Cancelled })
            );
        }
    }

    #[test]
    fn test_cancel_flags_refund_only_for_paid_gateway_orders() {
        let paid = plan(state(S::Confirmed, P::Paid, PaymentMethod::Razorpay), &Trigger::Cancel).unwrap();
        assert_eq!(paid, Plan::Apply { to: S::Cancelled, effects: vec![Effect::ReleaseStock, Effect::StampCancelled, Effect::FlagRefund] });
        let cod = plan(state(S::Pending, P::Pending, PaymentMethod::Cod), &Trigger::Cancel).unwrap();
        assert_eq!(cod, Plan::Apply { to: S::Cancelled, effects: vec![Effect::ReleaseStock, Effect::StampCancelled] });
    }

    #[test]
    fn test_admin_advance_moves_forward_only() {
        let s = state(S::Confirmed, P::Paid, PaymentMethod::Razorpay);
        assert_eq!(plan(s, &Trigger::Advance(S::Shipped)).unwrap(), Plan::Apply { to: S::Shipped, effects: vec![Effect::StampShipped] });
        assert_eq!(plan(s, &Trigger::Advance(S::Processing)).unwrap(), Plan::Apply { to: S::Processing, effects: vec![] });
        assert!(plan(s, &Trigger::Advance(S::Pending)).is_err());
        let delivered = state(S::Delivered, P::Paid, PaymentMethod::Razorpay);
        assert!(plan(delivered, &Trigger::Advance(S::Cancelled)).is_err());
    }

    #[test]
    fn test_admin_same_status_amends_without_stamps() {
        let shipped = state(S::Shipped, P::Pending, PaymentMethod::Cod);
        assert_eq!(plan(shipped, &Trigger::Advance(S::Shipped)).unwrap(), Plan::Apply { to: S::Shipped, effects: vec![] });
        let confirmed = state(S::Confirmed, P::Paid, PaymentMethod::Razorpay);
        assert_eq!(plan(confirmed, &Trigger::Advance(S::Confirmed)).unwrap(), Plan::Apply { to: S::Confirmed, effects: vec![] });
        for terminal in [S::Delivered, S::Cancelled] {
            let s = state(terminal, P::Pending, PaymentMethod::Cod);
            assert_eq!(plan(s, &Trigger::Advance(terminal)), Err(OrderError::InvalidTransition { from: terminal, to: terminal }));
        }
    }

    #[test]
    fn test_admin_cancel_uses_cancel_row() {
        let s = state(S::Confirmed, P::Paid, PaymentMethod::Razorpay);
        assert_eq!(plan(s, &Trigger::Advance(S::Cancelled)), plan(s, &Trigger::Cancel));
    }

    #[test]
    fn test_payment_captured_is_idempotent() {
        let settlement = Settlement { payment_id: "pay_1".into(), amount: crate::domain::value_objects::Money::from_major(10), method: None };
        let trigger = Trigger::PaymentCaptured(settlement);
        let fresh = state(S::Pending, P::Pending, PaymentMethod::Razorpay);
        assert_eq!(plan(fresh, &trigger).unwrap(), Plan::Apply { to: S::Pending, effects: vec![Effect::MarkPaid, Effect::RecordSettlement] });
        let settled = OrderState { payment: P::Paid, settled: true, ..fresh };
        assert!(matches!(plan(settled, &trigger).unwrap(), Plan::Ignore(_)));
    }

    #[test]
    fn test_payment_failed_releases_once() {
        let pending = state(S::Pending, P::Pending, PaymentMethod::Razorpay);
        assert_eq!(
            plan(pending, &Trigger::PaymentFailed).unwrap(),
            Plan::Apply { to: S::Cancelled, effects: vec![Effect::MarkPaymentFailed, Effect::ReleaseStock, Effect::StampCancelled] }
        );
        let already_cancelled = state(S::Cancelled, P::Pending, PaymentMethod::Razorpay);
        assert_eq!(plan(already_cancelled, &Trigger::PaymentFailed).unwrap(), Plan::Apply { to: S::Cancelled, effects: vec![Effect::MarkPaymentFailed] });
        let replay = state(S::Cancelled, P::Failed, PaymentMethod::Razorpay);
        assert!(matches!(plan(replay, &Trigger::PaymentFailed).unwrap(), Plan::Ignore(_)));
    }

    #[test]
    fn test_gateway_order_paid_confirms_pending_only() {
        let pending = state(S::Pending, P::Pending, PaymentMethod::Razorpay);
        assert_eq!(plan(pending, &Trigger::GatewayOrderPaid).unwrap(), Plan::Apply { to: S::Confirmed, effects: vec![Effect::StampConfirmed] });
        let confirmed = state(S::Confirmed, P::Paid, PaymentMethod::Razorpay);
        assert!(matches!(plan(confirmed, &Trigger::GatewayOrderPaid).unwrap(), Plan::Ignore(_)));
    }
}
