#[cfg(test)]
mod tests {
    use burn::{
        backend::NdArray,
        module::Param,
        prelude::*,
        tensor::{activation::relu, Distribution},
    };

    use crate::{
        grid::GridBuilder, identity, sampler::batch_map_offsets, DeformError,
        DeformableConv2dConfig, Layer, LayerParam, OffsetConv2dConfig, Resize2dConfig,
    };

    type TestBackend = NdArray;

    fn param(shape: [usize; 2]) -> LayerParam<TestBackend> {
        Param::from_tensor(Tensor::<TestBackend, 2>::zeros(shape, &Default::default())).into()
    }

    #[test]
    fn test_sampled_layout_matches_reference_transpose() {
        let device = Default::default();
        let (batch, height, width, channels) = (2, 5, 5, 3);
        let builder = GridBuilder::new([3, 3]).unwrap();
        let input = Tensor::<TestBackend, 4>::random(
            [batch, height, width, channels],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let offsets = Tensor::<TestBackend, 4>::zeros([batch, height, width, 18], &device);

        let mapped = batch_map_offsets(
            input.clone(),
            offsets,
            builder.base_grid([height, width]).to_tensor(&device),
        )
        .unwrap();

        assert_eq!(mapped.dims(), [batch, height, width, 9, channels]);
        let source = input.into_data().to_vec::<f32>().unwrap();
        let values = mapped.into_data().to_vec::<f32>().unwrap();
        let clip = |v: i64, bound: usize| v.clamp(0, bound as i64 - 1) as usize;
        let mut expected = Vec::with_capacity(values.len());
        for n in 0..batch {
            for h in 0..height {
                for w in 0..width {
                    for [dr, dc] in builder.kernel_offsets() {
                        let r = clip(h as i64 + dr, height);
                        let c = clip(w as i64 + dc, width);
                        for ch in 0..channels {
                            expected.push(source[((n * height + r) * width + c) * channels + ch]);
                        }
                    }
                }
            }
        }
        assert_eq!(values, expected);
    }

    #[test]
    fn test_parameter_dedup_through_offset_branch() {
        let device = Default::default();
        let (w1, w2, w3) = (param([1, 1]), param([1, 2]), param([1, 3]));
        let input = Layer::input(
            "input",
            Tensor::<TestBackend, 4>::random([1, 4, 4, 2], Distribution::Default, &device),
        );
        let layer_a = Layer::compose(
            &input,
            "a",
            input.outputs().clone(),
            [w1.clone(), w2.clone()],
        );
        let predictor = Layer::compose(
            &layer_a,
            "p",
            Tensor::<TestBackend, 4>::zeros([1, 4, 4, 18], &device),
            [w3.clone()],
        );

        let deformable = DeformableConv2dConfig::new([2, 5])
            .build("d", &layer_a, &predictor, identity)
            .unwrap();

        let ids = deformable.params().ids();
        assert_eq!(ids.len(), 5);
        assert_eq!(&ids[..3], &[w1.id(), w2.id(), w3.id()]);
        let dims: Vec<_> = deformable.params().iter().map(LayerParam::dims).collect();
        assert_eq!(dims[3], vec![9, 2, 5]);
        assert_eq!(dims[4], vec![5]);
        assert!(deformable.params().shares_prefix(layer_a.params()));
    }

    #[test]
    fn test_offset_mismatch_fails_before_building() {
        let device = Default::default();
        let input = Layer::input("input", Tensor::<TestBackend, 4>::zeros([1, 4, 4, 2], &device));
        let offsets = Layer::input(
            "offsets",
            Tensor::<TestBackend, 4>::zeros([1, 4, 4, 8], &device),
        );

        let result = DeformableConv2dConfig::new([2, 4]).build("d", &input, &offsets, identity);

        match result {
            Err(DeformError::ShapeMismatch {
                what,
                expected,
                actual,
            }) => {
                assert!(what.contains("offset channels"));
                assert_eq!(expected, "18");
                assert_eq!(actual, "8");
            }
            other => panic!("Expected ShapeMismatch error, got {other:?}"),
        }
    }

    #[test]
    fn test_input_channel_mismatch_fails() {
        let device = Default::default();
        let input = Layer::input("input", Tensor::<TestBackend, 4>::zeros([1, 4, 4, 3], &device));
        let offsets = OffsetConv2dConfig::new(3).build("offsets", &input).unwrap();

        let result = DeformableConv2dConfig::new([2, 4]).build("d", &input, &offsets, identity);

        assert!(matches!(result, Err(DeformError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_stacked_deformable_network() {
        let device = Default::default();
        let input = Layer::<TestBackend>::from_data(
            "input",
            Tensor::<TestBackend, 3>::random([6, 6, 3], Distribution::Default, &device).into_data(),
            &device,
        )
        .unwrap()
        .with_drop("input_drop", 0.9);

        let offset_1 = OffsetConv2dConfig::new(3).build("offset_1", &input).unwrap();
        let deform_1 = DeformableConv2dConfig::new([3, 8])
            .build("deform_1", &input, &offset_1, relu)
            .unwrap();
        let offset_2 = OffsetConv2dConfig::new(8).build("offset_2", &deform_1).unwrap();
        let deform_2 = DeformableConv2dConfig::new([8, 4])
            .build("deform_2", &deform_1, &offset_2, relu)
            .unwrap();
        let output = Resize2dConfig::new([2.0, 2.0]).build("up", &deform_2).unwrap();

        assert_eq!(output.dims(), [1, 12, 12, 4]);
        // Two offset convs and two deformable convs, each with weight and bias.
        assert_eq!(output.params().len(), 8);
        assert_eq!(
            output.params().num_elements(),
            (3 * 3 * 3 * 18 + 18) + (9 * 3 * 8 + 8) + (3 * 3 * 8 * 18 + 18) + (9 * 8 * 4 + 4)
        );
        assert_eq!(output.drop_map().get("input_drop"), Some(0.9));
        let values = output.into_outputs().into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite() && *v >= 0.0));
    }
}
