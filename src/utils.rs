use num_traits::Float;

/// Compute IoU between two bounding boxes as arrays: [x1, y1, x2, y2]
pub fn compute_iou_array<T: Float>(a: &[T; 4], b: &[T; 4]) -> T {
    compute_iou_tlbr(a[0], a[1], a[2], a[3], b[0], b[1], b[2], b[3])
}

/// Helper function to compute IoU from top-left and bottom-right coordinates
#[allow(clippy::too_many_arguments)]
pub fn compute_iou_tlbr<T: Float>(
    a_x1: T,
    a_y1: T,
    a_x2: T,
    a_y2: T,
    b_x1: T,
    b_y1: T,
    b_x2: T,
    b_y2: T,
) -> T {
    let zero = T::zero();
    let x1 = a_x1.max(b_x1);
    let y1 = a_y1.max(b_y1);
    let x2 = a_x2.min(b_x2);
    let y2 = a_y2.min(b_y2);

    let inter_area = (x2 - x1).max(zero) * (y2 - y1).max(zero);
    let a_area = (a_x2 - a_x1) * (a_y2 - a_y1);
    let b_area = (b_x2 - b_x1) * (b_y2 - b_y1);
    let union = a_area + b_area - inter_area;

    // NaN compares false, so a non-finite union also lands here
    if !(union > zero) {
        return zero;
    }

    let iou = inter_area / union;
    if iou.is_finite() {
        iou
    } else {
        zero
    }
}
