use hoidet::{
    EventSink, EventStorage, HoPairs, HoiError, HoiInferenceParams, HoiOutputs, HoiResult,
    ImageSize, OutputAdapter, PairDetections, PositiveWeights, RaggedBatch,
};

const SIZE: ImageSize = ImageSize {
    width: 100.0,
    height: 80.0,
};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn detections(person_scores: Vec<f32>, object_scores: Vec<f32>) -> PairDetections {
    let n = person_scores.len();
    let m = object_scores.len();
    PairDetections {
        person_boxes: (0..n).map(|i| [i as f32, 0.0, i as f32 + 4.0, 9.0]).collect(),
        object_boxes: (0..m).map(|j| [j as f32, 1.0, j as f32 + 6.0, 7.0]).collect(),
        person_box_scores: person_scores,
        object_box_scores: object_scores,
        object_box_classes: (0..m).collect(),
    }
}

struct BrokenSink;

impl EventSink for BrokenSink {
    fn put_scalar(&mut self, _name: &str, _value: f32) -> HoiResult<()> {
        Err(HoiError::Sink {
            reason: "unreachable".to_owned(),
        })
    }
}

#[test]
fn weighted_bce_matches_reference() {
    let weights = PositiveWeights::from_vec(vec![3.0, 1.0]).unwrap();
    let pairs = vec![HoPairs::training(SIZE, vec![1.0, 0.0], 2).unwrap()];
    let outputs = HoiOutputs::new(vec![0.0, 2.0], &pairs, &weights).unwrap();
    assert!(outputs.is_training());

    let losses = outputs.losses(None).unwrap();
    let expected = (3.0 * 2f64.ln() + 2.0 + (1.0 + (-2f64).exp()).ln()) / 2.0;
    assert_eq!(losses.len(), 1);
    assert!((losses["loss_action"] as f64 - expected).abs() < 1e-5);
}

#[test]
fn positive_weight_scales_only_positive_labels() {
    let uniform = PositiveWeights::uniform(1);
    let heavy = PositiveWeights::from_vec(vec![5.0]).unwrap();
    let negatives = vec![HoPairs::training(SIZE, vec![0.0, 0.0], 1).unwrap()];
    let positives = vec![HoPairs::training(SIZE, vec![1.0, 1.0], 1).unwrap()];
    let logits = vec![-0.4f32, 1.3];

    let loss = |pairs: &[HoPairs], w: &PositiveWeights| {
        HoiOutputs::new(logits.clone(), pairs, w)
            .unwrap()
            .losses(None)
            .unwrap()["loss_action"]
    };

    assert!((loss(&negatives, &uniform) - loss(&negatives, &heavy)).abs() < 1e-6);
    assert!((loss(&positives, &heavy) - 5.0 * loss(&positives, &uniform)).abs() < 1e-5);
}

#[test]
fn accuracy_diagnostics_are_recorded() {
    let weights = PositiveWeights::uniform(2);
    let pairs = vec![
        HoPairs::training(SIZE, vec![1.0, 0.0], 2).unwrap(),
        HoPairs::training(SIZE, vec![1.0, 1.0], 2).unwrap(),
    ];
    // probabilities: 0.5, 0.88 | 0.95, 0.12
    let outputs = HoiOutputs::new(vec![0.0, 2.0, 3.0, -2.0], &pairs, &weights).unwrap();
    let mut storage = EventStorage::new();
    outputs.losses(Some(&mut storage)).unwrap();

    assert_eq!(storage.latest("action/cls_accuracy"), Some(0.25));
    assert!((storage.latest("action/fg_cls_accuracy").unwrap() - 1.0 / 3.0).abs() < 1e-6);
    assert!((storage.latest("action/false_negative").unwrap() - 2.0 / 3.0).abs() < 1e-6);
}

#[test]
fn diagnostics_skip_fg_ratios_without_positives() {
    let weights = PositiveWeights::uniform(2);
    let pairs = vec![HoPairs::training(SIZE, vec![0.0, 0.0], 2).unwrap()];
    let outputs = HoiOutputs::new(vec![-1.0, 1.0], &pairs, &weights).unwrap();
    let mut storage = EventStorage::new();
    outputs.losses(Some(&mut storage)).unwrap();

    assert_eq!(storage.latest("action/cls_accuracy"), Some(0.5));
    assert_eq!(storage.latest("action/fg_cls_accuracy"), None);
    assert_eq!(storage.latest("action/false_negative"), None);
}

#[test]
fn sink_failure_does_not_change_the_loss() {
    let weights = PositiveWeights::from_vec(vec![2.0, 4.0]).unwrap();
    let pairs = vec![HoPairs::training(SIZE, vec![1.0, 0.0, 0.0, 1.0], 2).unwrap()];
    let logits = vec![0.3, -0.2, 1.1, -2.5];

    let plain = HoiOutputs::new(logits.clone(), &pairs, &weights)
        .unwrap()
        .losses(None)
        .unwrap();
    let mut broken = BrokenSink;
    let with_sink = HoiOutputs::new(logits, &pairs, &weights)
        .unwrap()
        .losses(Some(&mut broken))
        .unwrap();
    assert_eq!(plain, with_sink);
}

#[test]
fn zero_instances_give_exact_zero_loss() {
    let weights = PositiveWeights::uniform(3);

    let empty_batch: Vec<HoPairs> = Vec::new();
    let outputs = HoiOutputs::new(Vec::new(), &empty_batch, &weights).unwrap();
    assert!(outputs.no_instances());
    let losses = outputs.losses(None).unwrap();
    assert_eq!(losses["loss_action"], 0.0);
    assert_eq!(losses.keys().copied().collect::<Vec<_>>(), vec!["loss_action"]);

    let pairless = vec![
        HoPairs::training(SIZE, Vec::new(), 3).unwrap(),
        HoPairs::training(SIZE, Vec::new(), 3).unwrap(),
    ];
    let mut storage = EventStorage::new();
    let losses = HoiOutputs::new(Vec::new(), &pairless, &weights)
        .unwrap()
        .losses(Some(&mut storage))
        .unwrap();
    assert_eq!(losses["loss_action"], 0.0);
    assert!(!losses["loss_action"].is_nan());
    assert_eq!(storage.names().count(), 0);
}

#[test]
fn predict_probs_partitions_the_batch() {
    let weights = PositiveWeights::uniform(2);
    let pairs = vec![
        HoPairs::inference(SIZE, detections(vec![0.9, 0.8], vec![0.7])).unwrap(),
        HoPairs::inference(SIZE, detections(vec![], vec![0.7, 0.2])).unwrap(),
        HoPairs::inference(SIZE, detections(vec![0.5], vec![0.6])).unwrap(),
    ];
    let logits = vec![0.1, -0.3, 2.0, -4.0, 0.0, 1.5];
    let outputs = HoiOutputs::new(logits.clone(), &pairs, &weights).unwrap();
    assert_eq!(outputs.num_preds_per_image(), vec![2, 0, 1]);

    let probs = outputs.predict_probs();
    let parts = probs.split();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].len(), 4);
    assert!(parts[1].is_empty());
    assert_eq!(parts[2].len(), 2);

    let joined = RaggedBatch::concat(&parts);
    assert_eq!(joined.as_slice(), probs.flat());
    for (p, x) in joined.iter().zip(logits) {
        assert!((*p as f64 - sigmoid(x as f64)).abs() < 1e-6);
    }
}

#[test]
fn pair_counts_must_match_logit_rows() {
    let weights = PositiveWeights::uniform(2);
    let pairs = vec![HoPairs::training(SIZE, vec![0.0; 4], 2).unwrap()];
    let err = HoiOutputs::new(vec![0.0; 5], &pairs, &weights).err().unwrap();
    assert_eq!(
        err,
        HoiError::SplitMismatch {
            expected: 4,
            total: 5,
        }
    );
}

#[test]
fn gt_width_must_match_weights() {
    let weights = PositiveWeights::uniform(2);
    let pairs = vec![HoPairs::training(SIZE, vec![0.0; 3], 3).unwrap()];
    let err = HoiOutputs::new(vec![0.0; 2], &pairs, &weights).err().unwrap();
    assert_eq!(
        err,
        HoiError::LengthMismatch {
            what: "gt_actions",
            expected: 2,
            got: 3,
        }
    );
}

#[test]
fn mixed_annotations_are_rejected() {
    let weights = PositiveWeights::uniform(1);
    let pairs = vec![
        HoPairs::training(SIZE, vec![1.0], 1).unwrap(),
        HoPairs::inference(SIZE, detections(vec![0.9], vec![0.9])).unwrap(),
    ];
    let err = HoiOutputs::new(vec![0.0, 0.0], &pairs, &weights).err().unwrap();
    assert_eq!(err, HoiError::MixedAnnotations);
}

#[test]
fn inference_runs_filter_per_image_in_batch_order() {
    let weights = PositiveWeights::uniform(2);
    let pairs = vec![
        HoPairs::inference(SIZE, detections(vec![1.0, 1.0], vec![1.0])).unwrap(),
        HoPairs::inference(SIZE, detections(vec![], vec![1.0])).unwrap(),
        HoPairs::inference(ImageSize::new(50.0, 40.0), detections(vec![1.0], vec![1.0, 1.0]))
            .unwrap(),
    ];
    // image 0: persons 0 and 1 x object 0; image 2: person 0 x objects 0 and 1
    let logits = vec![3.0, -3.0, -3.0, 3.0, -3.0, -3.0, 3.0, 3.0];
    let outputs = HoiOutputs::new(logits, &pairs, &weights).unwrap();
    let params = HoiInferenceParams {
        score_threshold: 0.5,
        topk_per_image: -1,
        parallel: false,
    };
    let results = outputs.inference(&params).unwrap();

    assert_eq!(results.len(), 3);
    let triples = |i: usize| -> Vec<(usize, usize, usize)> {
        results[i]
            .detections()
            .iter()
            .map(|d| (d.person_index, d.object_index, d.action_class))
            .collect()
    };
    assert_eq!(triples(0), vec![(0, 0, 0), (1, 0, 1)]);
    assert!(results[1].is_empty());
    assert_eq!(triples(2), vec![(0, 1, 0), (0, 1, 1)]);
    assert_eq!(results[2].image_size(), ImageSize::new(50.0, 40.0));

    let fused = results[0].detections()[0].score as f64;
    assert!((fused - sigmoid(3.0)).abs() < 1e-6);
}

#[test]
fn inference_needs_detections() {
    let weights = PositiveWeights::uniform(1);
    let pairs = vec![HoPairs::training(SIZE, vec![1.0], 1).unwrap()];
    let outputs = HoiOutputs::new(vec![0.0], &pairs, &weights).unwrap();
    let err = outputs.inference(&HoiInferenceParams::default()).err().unwrap();
    assert!(matches!(err, HoiError::MissingAnnotations { .. }));

    let empty: Vec<HoPairs> = Vec::new();
    let outputs = HoiOutputs::new(Vec::new(), &empty, &weights).unwrap();
    assert!(outputs.inference(&HoiInferenceParams::default()).unwrap().is_empty());
}

#[test]
fn losses_need_ground_truth() {
    let weights = PositiveWeights::uniform(1);
    let pairs = vec![HoPairs::inference(SIZE, detections(vec![0.9], vec![0.9])).unwrap()];
    let outputs = HoiOutputs::new(vec![0.0], &pairs, &weights).unwrap();
    let err = outputs.losses(None).err().unwrap();
    assert_eq!(
        err,
        HoiError::MissingAnnotations {
            what: "gt_actions",
        }
    );
}

#[test]
fn inference_pairs_reject_mismatched_scores() {
    let mut dets = detections(vec![0.9, 0.3], vec![0.5]);
    dets.person_box_scores.pop();
    let err = HoPairs::inference(SIZE, dets).err().unwrap();
    assert_eq!(
        err,
        HoiError::LengthMismatch {
            what: "person_box_scores",
            expected: 2,
            got: 1,
        }
    );
}
