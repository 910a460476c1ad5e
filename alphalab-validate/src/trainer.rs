//! Strategy callables the validation drivers evaluate.
//!
//! The drivers own fold construction and scoring; the caller supplies the
//! model or strategy behind one of these traits. Both are `Sync` so folds
//! can run in parallel, and both are implemented for plain closures.

use alphalab_core::PriceTable;

/// A predictive model evaluated by purged cross-validation.
///
/// `fit_predict` trains on the given rows and returns one prediction per
/// test row. Errors are surfaced by the driver with the fold index
/// attached.
pub trait SignalModel: Sync {
    fn fit_predict(
        &self,
        train_x: &[Vec<f64>],
        train_y: &[f64],
        test_x: &[Vec<f64>],
    ) -> anyhow::Result<Vec<f64>>;
}

impl<F> SignalModel for F
where
    F: Fn(&[Vec<f64>], &[f64], &[Vec<f64>]) -> anyhow::Result<Vec<f64>> + Sync,
{
    fn fit_predict(
        &self,
        train_x: &[Vec<f64>],
        train_y: &[f64],
        test_x: &[Vec<f64>],
    ) -> anyhow::Result<Vec<f64>> {
        self(train_x, train_y, test_x)
    }
}

/// Per-fold daily return series produced by a walk-forward strategy.
#[derive(Debug, Clone, Default)]
pub struct FoldReturns {
    pub in_sample: Vec<f64>,
    pub out_of_sample: Vec<f64>,
}

/// A tradable strategy evaluated by walk-forward validation.
///
/// `fit_and_trade` fits on the training slice, trades the test slice, and
/// returns the daily return series realized on each.
pub trait WalkForwardStrategy: Sync {
    fn fit_and_trade(&self, train: &PriceTable, test: &PriceTable)
        -> anyhow::Result<FoldReturns>;
}

impl<F> WalkForwardStrategy for F
where
    F: Fn(&PriceTable, &PriceTable) -> anyhow::Result<FoldReturns> + Sync,
{
    fn fit_and_trade(
        &self,
        train: &PriceTable,
        test: &PriceTable,
    ) -> anyhow::Result<FoldReturns> {
        self(train, test)
    }
}
