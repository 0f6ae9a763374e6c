use nalgebra::DMatrix;

use crate::detection::BBox;

/// Result of matching one frame's detections against the live tracks.
/// Indices refer to the slices passed to [`associate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// (track index, detection index) pairs, ordered by track index.
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Pairwise IoU, tracks as rows and detections as columns.
pub fn iou_matrix(tracks: &[BBox], detections: &[BBox]) -> DMatrix<f32> {
    DMatrix::from_fn(tracks.len(), detections.len(), |i, j| {
        tracks[i].iou(&detections[j])
    })
}

/// Match predicted track boxes to detections, maximizing total IoU.
///
/// Pairs whose IoU falls below `min_iou` after solving are split back into
/// an unmatched track and an unmatched detection.
pub fn associate(tracks: &[BBox], detections: &[BBox], min_iou: f32) -> Assignment {
    if tracks.is_empty() || detections.is_empty() {
        return Assignment {
            matches: Vec::new(),
            unmatched_tracks: (0..tracks.len()).collect(),
            unmatched_detections: (0..detections.len()).collect(),
        };
    }

    let ious = iou_matrix(tracks, detections);
    let row_to_col = max_weight_assignment(&ious.map(f64::from));

    let mut matches = Vec::new();
    let mut track_matched = vec![false; tracks.len()];
    let mut det_matched = vec![false; detections.len()];

    for (i, col) in row_to_col.iter().enumerate() {
        if let Some(j) = *col {
            if ious[(i, j)] >= min_iou {
                matches.push((i, j));
                track_matched[i] = true;
                det_matched[j] = true;
            }
        }
    }

    Assignment {
        matches,
        unmatched_tracks: unmatched(&track_matched),
        unmatched_detections: unmatched(&det_matched),
    }
}

fn unmatched(matched: &[bool]) -> Vec<usize> {
    matched
        .iter()
        .enumerate()
        .filter(|(_, m)| !**m)
        .map(|(i, _)| i)
        .collect()
}

/// Optimal assignment maximizing the summed weight of chosen cells.
///
/// Returns, for every row, the column it is assigned to. Exactly
/// `min(rows, cols)` rows receive a column. Weights must be finite; a
/// non-finite weight is treated as 0.
pub fn max_weight_assignment(weights: &DMatrix<f64>) -> Vec<Option<usize>> {
    let (rows, cols) = weights.shape();
    if rows == 0 || cols == 0 {
        return vec![None; rows];
    }

    let w_max = weights
        .iter()
        .copied()
        .filter(|w| w.is_finite())
        .fold(0.0f64, f64::max);
    let cost = |w: f64| if w.is_finite() { w_max - w } else { w_max };

    // The solver needs rows <= cols; solve the transpose otherwise.
    if rows <= cols {
        let costs = DMatrix::from_fn(rows, cols, |i, j| cost(weights[(i, j)]));
        hungarian(&costs)
    } else {
        let costs = DMatrix::from_fn(cols, rows, |i, j| cost(weights[(j, i)]));
        let col_to_row = hungarian(&costs);
        let mut row_to_col = vec![None; rows];
        for (col, row) in col_to_row.iter().enumerate() {
            if let Some(row) = *row {
                row_to_col[row] = Some(col);
            }
        }
        row_to_col
    }
}

/// Min-cost assignment with row/column potentials (Kuhn-Munkres, O(n^2 m)).
/// Requires `rows <= cols`; every row is assigned.
fn hungarian(cost: &DMatrix<f64>) -> Vec<Option<usize>> {
    let (n, m) = cost.shape();
    debug_assert!(n <= m, "hungarian requires rows <= cols, got {}x{}", n, m);

    // 1-based, index 0 is the virtual root of each augmenting search
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = cost[(i0 - 1, j - 1)] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            // Unreachable with finite costs and n <= m
            if j1 == 0 {
                break;
            }

            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Flip the augmenting path back to the root
        while j0 != 0 {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
        }
    }

    let mut row_to_col = vec![None; n];
    for j in 1..=m {
        if p[j] != 0 {
            row_to_col[p[j] - 1] = Some(j - 1);
        }
    }
    row_to_col
}
