use bt_types::{validation_error, BtResult, DataError};

/// Area under the ROC curve via the Mann-Whitney rank-sum statistic.
///
/// Tied scores share their mid-rank, so a constant predictor scores 0.5.
/// Labels are 0/1; any non-zero label counts as positive.
pub fn auc(scores: &[f64], labels: &[u8]) -> BtResult<f64> {
    if scores.len() != labels.len() {
        return Err(validation_error!(
            "{} scores but {} labels",
            scores.len(),
            labels.len()
        ));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(validation_error!("score {} is not finite", bad));
    }

    let n_pos = labels.iter().filter(|&&l| l != 0).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(DataError::InsufficientData {
            message: format!("AUC needs both classes, got {n_pos} positive and {n_neg} negative"),
        }
        .into());
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the group [start, end) shares the mean rank.
        let mid_rank = (start + end + 1) as f64 / 2.0;
        let positives = order[start..end].iter().filter(|&&i| labels[i] != 0).count();
        positive_rank_sum += mid_rank * positives as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_types::BtError;

    #[test]
    fn perfect_ranking_scores_one() {
        assert_eq!(auc(&[0.1, 0.2, 0.8, 0.9], &[0, 0, 1, 1]).unwrap(), 1.0);
        assert_eq!(auc(&[0.9, 0.8, 0.2, 0.1], &[0, 0, 1, 1]).unwrap(), 0.0);
    }

    #[test]
    fn ties_use_mid_ranks() {
        assert_eq!(auc(&[0.5; 6], &[0, 1, 0, 1, 1, 0]).unwrap(), 0.5);
        // One positive above both negatives, one tied with a negative.
        let score = auc(&[0.2, 0.5, 0.5, 0.9], &[0, 0, 1, 1]).unwrap();
        assert!((score - 0.875).abs() < 1e-12);
    }

    #[test]
    fn single_class_is_undefined() {
        let err = auc(&[0.1, 0.9], &[1, 1]).unwrap_err();
        assert!(matches!(err, BtError::Data(DataError::InsufficientData { .. })));
    }

    #[test]
    fn rejects_mismatched_or_non_finite_input() {
        assert!(auc(&[0.1], &[0, 1]).is_err());
        assert!(auc(&[f64::NAN, 0.3], &[0, 1]).is_err());
    }
}
