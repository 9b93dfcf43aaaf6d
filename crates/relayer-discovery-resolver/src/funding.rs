use crate::resolver::PayerRequests;
use crate::DiscoveryError;

/// How the payer gets funded right before a final transaction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingPlan {
    /// Sum of all `Payer` amounts of the final transaction.
    pub requested: u64,
    /// The payer balance the plan was computed from.
    pub current_balance: u64,
    /// Lamports to transfer to the payer. Zero if it already holds enough.
    pub top_up: u64,
}

/// Computes the exact top-up for a final transaction.
///
/// The payer is brought to exactly the requested amount and never beyond, so no
/// lamports are left behind in it once the destination program took what it
/// asked for.
///
/// # Errors
///
/// [`DiscoveryError::FundingMismatch`] if the request exceeds `gas_budget`. Nothing
/// is funded in that case.
pub fn plan_funding(
    requests: &PayerRequests,
    current_balance: u64,
    gas_budget: u64,
) -> Result<FundingPlan, DiscoveryError> {
    let requested = requests.total();
    if requested > gas_budget {
        return Err(DiscoveryError::FundingMismatch {
            requested,
            budget: gas_budget,
        });
    }

    Ok(FundingPlan {
        requested,
        current_balance,
        top_up: requested.saturating_sub(current_balance),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn requests(amounts: &[u64]) -> PayerRequests {
        let mut requests = PayerRequests::default();
        for amount in amounts {
            requests.record(*amount);
        }
        requests
    }

    #[rstest]
    #[case::empty_payer(&[1_000], 0, 1_000)]
    #[case::partially_funded(&[1_000], 400, 600)]
    #[case::already_funded(&[1_000], 5_000, 0)]
    #[case::summed_requests(&[300, 700], 100, 900)]
    #[case::no_payer(&[], 0, 0)]
    fn tops_up_the_exact_shortfall(
        #[case] amounts: &[u64],
        #[case] balance: u64,
        #[case] top_up: u64,
    ) {
        let plan = plan_funding(&requests(amounts), balance, 10_000).unwrap();
        assert_eq!(plan.top_up, top_up);
        assert_eq!(plan.requested, amounts.iter().sum::<u64>());
    }

    #[test]
    fn budget_is_inclusive() {
        assert!(plan_funding(&requests(&[1_000]), 0, 1_000).is_ok());
    }

    #[test]
    fn request_above_budget_is_rejected() {
        assert_eq!(
            plan_funding(&requests(&[600, 600]), 0, 1_000),
            Err(DiscoveryError::FundingMismatch {
                requested: 1_200,
                budget: 1_000
            })
        );
    }
}
