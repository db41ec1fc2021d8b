use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::child::AstChild;
use crate::ast::op::{AstOp, visit_post_order};

/// Rebuild the graph under `root` so structurally equal operations are
/// represented by a single shared instance (hash-consing).
///
/// Works bottom-up: every operation is cloned with its children remapped
/// to canonical instances, then matched against previously seen
/// operations by hash bucket and [`AstOp::is_equal`]. Because children
/// are canonicalised first, one shallow identity comparison per level is
/// enough to recognise deep structural equality.
///
/// The rebuilt operations are unlinked; run this before linking.
pub fn dedup_graph(root: &Rc<AstOp>) -> Rc<AstOp> {
    let order = visit_post_order(std::slice::from_ref(root));
    let mut canonical: HashMap<usize, Rc<AstOp>> = HashMap::with_capacity(order.len());
    let mut buckets: HashMap<u64, Vec<Rc<AstOp>>> = HashMap::new();
    let mut merged = 0usize;

    for op in &order {
        let rebuilt = op.clone_with(&mut |c| match c.child() {
            None => AstChild::none(),
            Some(child) => match canonical.get(&(Rc::as_ptr(child) as usize)) {
                Some(mapped) => AstChild::new(mapped.clone()),
                None => {
                    debug_assert!(false, "post-order dedup visited a parent before its child");
                    AstChild::none()
                }
            },
        });
        let bucket = buckets.entry(rebuilt.hash()).or_default();
        let canon = match bucket.iter().find(|seen| seen.is_equal(&rebuilt)) {
            Some(existing) => {
                merged += 1;
                existing.clone()
            }
            None => {
                bucket.push(rebuilt.clone());
                rebuilt
            }
        };
        canonical.insert(Rc::as_ptr(op) as usize, canon);
    }

    tracing::debug!(ops = order.len(), merged, "dedup pass complete");
    match canonical.get(&(Rc::as_ptr(root) as usize)) {
        Some(canon) => canon.clone(),
        None => root.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::op::OpData;

    fn invert(base: &Rc<AstOp>) -> Rc<AstOp> {
        AstOp::new(OpData::ImageInvert {
            base: AstChild::new(base.clone()),
        })
    }

    #[test]
    fn merges_structurally_equal_subtrees() {
        // Two distinct but equal constant+invert chains under one layer.
        let image = Rc::new(crate::foundation::asset::Image::new(
            [4, 4],
            crate::foundation::asset::ImageFormat::Rgba8,
        ));
        let a = AstOp::new(OpData::ImageConstant {
            image: image.clone(),
        });
        let b = AstOp::new(OpData::ImageConstant { image });
        let root = AstOp::new(OpData::ImageSaturate {
            base: AstChild::new(invert(&a)),
            factor: AstChild::new(invert(&b)),
        });

        let deduped = dedup_graph(&root);
        let (base, factor) = match deduped.data() {
            OpData::ImageSaturate { base, factor } => (base, factor),
            other => panic!("unexpected root payload {other:?}"),
        };
        let base = base.child().expect("base present");
        let factor = factor.child().expect("factor present");
        assert!(Rc::ptr_eq(base, factor), "equal subtrees must merge");
    }

    #[test]
    fn distinct_subtrees_stay_distinct() {
        let image = Rc::new(crate::foundation::asset::Image::new(
            [4, 4],
            crate::foundation::asset::ImageFormat::Rgba8,
        ));
        let constant = AstOp::new(OpData::ImageConstant { image });
        let root = AstOp::new(OpData::ImageSaturate {
            base: AstChild::new(invert(&constant)),
            factor: AstChild::new(AstOp::new(OpData::ImageLuminance {
                base: AstChild::new(constant.clone()),
            })),
        });

        let deduped = dedup_graph(&root);
        let (base, factor) = match deduped.data() {
            OpData::ImageSaturate { base, factor } => (base, factor),
            other => panic!("unexpected root payload {other:?}"),
        };
        assert!(!Rc::ptr_eq(
            base.child().expect("base"),
            factor.child().expect("factor")
        ));
    }
}
