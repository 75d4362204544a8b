use rand::{SeedableRng, rngs::StdRng};
use revel_core::buffer::BufferError;
use revel_core::buffer::deque::DequeMultiEnvBuffer;
use revel_core::numeric::Frame;

/// Max over the spatial positions of every history plane, newest last.
/// Mirrors how the image fixtures collapse to one value per plane.
fn plane_max(frame: &Frame) -> Vec<f32> {
    let history = *frame.shape().last().unwrap();
    let spatial = frame.numel() / history;
    (0..history)
        .map(|plane| {
            (0..spatial)
                .map(|s| frame.data()[s * history + plane])
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .collect()
}

/// Constant fill per env: env 0 holds `i + 1`, env 1 holds `10 * (i + 1)`.
fn image_item(i: usize) -> Frame {
    let mut data = vec![1.; 8];
    for v in &mut data[..4] {
        *v *= (i + 1) as f32;
    }
    for v in &mut data[4..] {
        *v *= 10. * (i + 1) as f32;
    }
    Frame::new(data, vec![2, 2, 2, 1])
}

fn zero_actions() -> Frame {
    Frame::new(vec![0., 0.], vec![2])
}

fn image_buffer() -> DequeMultiEnvBuffer {
    DequeMultiEnvBuffer::new(20, 2, vec![2, 2, 1], vec![])
}

fn half_filled_buffer() -> DequeMultiEnvBuffer {
    let mut buffer = image_buffer();
    for i in 0..10 {
        let reward = i as f32 / 2.;
        buffer.store_transition(&image_item(i), &zero_actions(), &[reward, reward], &[false, false]);
    }
    buffer
}

fn filled_buffer() -> DequeMultiEnvBuffer {
    let mut buffer = image_buffer();
    for i in 0..30 {
        let reward = i as f32 / 2.;
        buffer.store_transition(&image_item(i), &zero_actions(), &[reward, reward], &[false, false]);
    }
    buffer
}

fn filled_buffer_with_dones() -> DequeMultiEnvBuffer {
    let done_set = [2, 5, 10, 13, 18, 22, 28];
    let mut buffer = image_buffer();
    for i in 0..30 {
        let reward = i as f32 / 2.;
        let dones = [done_set.contains(&i), done_set.contains(&(i + 1))];
        buffer.store_transition(&image_item(i), &zero_actions(), &[reward, reward], &dones);
    }
    buffer
}

#[test]
fn simple_get_frame() {
    let mut buffer = image_buffer();
    for scale in [1., 2., 3.] {
        let mut data = vec![scale; 8];
        for v in &mut data[4..] {
            *v *= 2.;
        }
        let item = Frame::new(data, vec![2, 2, 2, 1]);
        buffer.store_transition(&item, &zero_actions(), &[0., 0.], &[false, false]);
    }

    assert_eq!(plane_max(&buffer.get_frame(0, 0, 4).unwrap()), vec![0., 0., 0., 1.]);
    assert_eq!(plane_max(&buffer.get_frame(1, 0, 4).unwrap()), vec![0., 0., 1., 2.]);
    assert_eq!(plane_max(&buffer.get_frame(2, 0, 4).unwrap()), vec![0., 1., 2., 3.]);

    assert_eq!(plane_max(&buffer.get_frame(0, 1, 4).unwrap()), vec![0., 0., 0., 2.]);
    assert_eq!(plane_max(&buffer.get_frame(1, 1, 4).unwrap()), vec![0., 0., 2., 4.]);
    assert_eq!(plane_max(&buffer.get_frame(2, 1, 4).unwrap()), vec![0., 2., 4., 6.]);

    for env in 0..2 {
        for index in [3, 4] {
            assert!(matches!(
                buffer.get_frame(index, env, 4),
                Err(BufferError::FrameNotAccessible { .. })
            ));
        }
    }
}

#[test]
fn full_buffer_get_frame() {
    let buffer = filled_buffer();

    assert_eq!(plane_max(&buffer.get_frame(0, 0, 4).unwrap()), vec![18., 19., 20., 21.]);
    assert_eq!(plane_max(&buffer.get_frame(1, 0, 4).unwrap()), vec![19., 20., 21., 22.]);
    assert_eq!(plane_max(&buffer.get_frame(9, 0, 4).unwrap()), vec![27., 28., 29., 30.]);

    assert_eq!(plane_max(&buffer.get_frame(0, 1, 4).unwrap()), vec![180., 190., 200., 210.]);
    assert_eq!(plane_max(&buffer.get_frame(1, 1, 4).unwrap()), vec![190., 200., 210., 220.]);
    assert_eq!(plane_max(&buffer.get_frame(9, 1, 4).unwrap()), vec![270., 280., 290., 300.]);

    // the three slots behind the write head straddle it
    for env in 0..2 {
        for index in [10, 11, 12] {
            assert!(buffer.get_frame(index, env, 4).is_err());
        }
    }

    assert_eq!(plane_max(&buffer.get_frame(13, 0, 4).unwrap()), vec![11., 12., 13., 14.]);
    assert_eq!(plane_max(&buffer.get_frame(19, 0, 4).unwrap()), vec![17., 18., 19., 20.]);

    assert_eq!(plane_max(&buffer.get_frame(13, 1, 4).unwrap()), vec![110., 120., 130., 140.]);
    assert_eq!(plane_max(&buffer.get_frame(19, 1, 4).unwrap()), vec![170., 180., 190., 200.]);
}

#[test]
fn full_buffer_get_future_frame() {
    let buffer = filled_buffer();

    let future = |index, env| buffer.get_frame_with_future(index, env, 4).unwrap().1;
    assert_eq!(plane_max(&future(0, 0)), vec![19., 20., 21., 22.]);
    assert_eq!(plane_max(&future(1, 0)), vec![20., 21., 22., 23.]);

    assert_eq!(plane_max(&future(0, 1)), vec![190., 200., 210., 220.]);
    assert_eq!(plane_max(&future(1, 1)), vec![200., 210., 220., 230.]);

    for env in 0..2 {
        for index in [9, 10, 11, 12] {
            assert!(buffer.get_frame_with_future(index, env, 4).is_err());
        }
    }

    assert_eq!(plane_max(&future(13, 0)), vec![12., 13., 14., 15.]);
    assert_eq!(plane_max(&future(19, 0)), vec![18., 19., 20., 21.]);

    assert_eq!(plane_max(&future(13, 1)), vec![120., 130., 140., 150.]);
    assert_eq!(plane_max(&future(19, 1)), vec![180., 190., 200., 210.]);
}

#[test]
fn buffer_filling_size() {
    let mut buffer = image_buffer();
    assert_eq!(buffer.current_size(), 0);

    buffer.store_transition(&image_item(0), &zero_actions(), &[0., 0.], &[false, false]);
    buffer.store_transition(&image_item(0), &zero_actions(), &[0., 0.], &[false, false]);
    assert_eq!(buffer.current_size(), 2);

    for i in 0..30 {
        buffer.store_transition(&image_item(i), &zero_actions(), &[0., 0.], &[false, false]);
    }
    assert_eq!(buffer.current_size(), buffer.capacity());
}

#[test]
fn get_frame_with_dones() {
    let buffer = filled_buffer_with_dones();

    assert_eq!(plane_max(&buffer.get_frame(0, 0, 4).unwrap()), vec![0., 0., 20., 21.]);
    assert_eq!(plane_max(&buffer.get_frame(1, 0, 4).unwrap()), vec![0., 20., 21., 22.]);
    assert_eq!(plane_max(&buffer.get_frame(2, 0, 4).unwrap()), vec![20., 21., 22., 23.]);
    assert_eq!(plane_max(&buffer.get_frame(3, 0, 4).unwrap()), vec![0., 0., 0., 24.]);

    assert_eq!(plane_max(&buffer.get_frame(8, 0, 4).unwrap()), vec![26., 27., 28., 29.]);
    assert_eq!(plane_max(&buffer.get_frame(9, 0, 4).unwrap()), vec![0., 0., 0., 30.]);

    assert_eq!(plane_max(&buffer.get_frame(0, 1, 4).unwrap()), vec![0., 190., 200., 210.]);
    assert_eq!(plane_max(&buffer.get_frame(1, 1, 4).unwrap()), vec![190., 200., 210., 220.]);
    assert_eq!(plane_max(&buffer.get_frame(2, 1, 4).unwrap()), vec![0., 0., 0., 230.]);
    assert_eq!(plane_max(&buffer.get_frame(3, 1, 4).unwrap()), vec![0., 0., 230., 240.]);

    assert_eq!(plane_max(&buffer.get_frame(8, 1, 4).unwrap()), vec![0., 0., 0., 290.]);
    assert_eq!(plane_max(&buffer.get_frame(9, 1, 4).unwrap()), vec![0., 0., 290., 300.]);

    assert!(buffer.get_frame(10, 0, 4).is_err());
    assert!(buffer.get_frame(10, 1, 4).is_err());

    assert_eq!(plane_max(&buffer.get_frame(11, 0, 4).unwrap()), vec![0., 0., 0., 12.]);
    assert_eq!(plane_max(&buffer.get_frame(12, 0, 4).unwrap()), vec![0., 0., 12., 13.]);

    assert!(buffer.get_frame(11, 1, 4).is_err());
    assert!(buffer.get_frame(12, 1, 4).is_err());
}

#[test]
fn get_frame_future_with_dones() {
    let buffer = filled_buffer_with_dones();
    let future = |index, env| buffer.get_frame_with_future(index, env, 4).unwrap().1;

    assert_eq!(plane_max(&future(0, 0)), vec![0., 20., 21., 22.]);
    assert_eq!(plane_max(&future(1, 0)), vec![20., 21., 22., 23.]);
    assert_eq!(plane_max(&future(2, 0)), vec![21., 22., 23., 0.]);

    assert_eq!(plane_max(&future(3, 0)), vec![0., 0., 24., 25.]);
    assert_eq!(plane_max(&future(8, 0)), vec![27., 28., 29., 0.]);

    assert_eq!(plane_max(&future(0, 1)), vec![190., 200., 210., 220.]);
    assert_eq!(plane_max(&future(1, 1)), vec![200., 210., 220., 0.]);
    assert_eq!(plane_max(&future(2, 1)), vec![0., 0., 230., 240.]);

    assert_eq!(plane_max(&future(3, 1)), vec![0., 230., 240., 250.]);
    assert_eq!(plane_max(&future(7, 1)), vec![260., 270., 280., 0.]);

    for env in 0..2 {
        for index in [9, 10] {
            assert!(buffer.get_frame_with_future(index, env, 4).is_err());
        }
    }

    assert_eq!(plane_max(&future(11, 0)), vec![0., 0., 12., 13.]);
    assert_eq!(plane_max(&future(12, 0)), vec![0., 12., 13., 14.]);

    assert!(buffer.get_frame_with_future(11, 1, 4).is_err());
    assert!(buffer.get_frame_with_future(12, 1, 4).is_err());

    assert_eq!(plane_max(&future(13, 1)), vec![0., 0., 140., 150.]);
}

#[test]
fn get_batch() {
    let buffer = filled_buffer_with_dones();

    let indexes: Vec<Vec<usize>> = (0..8).map(|b| vec![b, b + 1]).collect();
    let batch = buffer.get_batch(&indexes, 4).unwrap();

    let env0_dones: Vec<bool> = (0..8).map(|b| batch.dones[b * 2]).collect();
    let env1_dones: Vec<bool> = (0..8).map(|b| batch.dones[b * 2 + 1]).collect();
    assert_eq!(env0_dones, vec![false, false, true, false, false, false, false, false]);
    assert_eq!(env1_dones, vec![true, false, false, false, false, false, true, false]);

    let state = |b: usize, env: usize| batch.states.subframe(b).subframe(env);
    let next_state = |b: usize, env: usize| batch.next_states.subframe(b).subframe(env);

    let expected_env0 = [
        [0., 0., 20., 21.],
        [0., 20., 21., 22.],
        [20., 21., 22., 23.],
        [0., 0., 0., 24.],
        [0., 0., 24., 25.],
        [0., 24., 25., 26.],
        [24., 25., 26., 27.],
        [25., 26., 27., 28.],
    ];
    let expected_env1 = [
        [190., 200., 210., 220.],
        [0., 0., 0., 230.],
        [0., 0., 230., 240.],
        [0., 230., 240., 250.],
        [230., 240., 250., 260.],
        [240., 250., 260., 270.],
        [250., 260., 270., 280.],
        [0., 0., 0., 290.],
    ];
    for b in 0..8 {
        assert_eq!(plane_max(&state(b, 0)), expected_env0[b]);
        assert_eq!(plane_max(&state(b, 1)), expected_env1[b]);
    }

    for b in 0..8 {
        assert_eq!(batch.actions.data()[b * 2], 0.);
        assert_eq!(batch.actions.data()[b * 2 + 1], 0.);
        assert_eq!(batch.rewards.data()[b * 2], 10. + b as f32 / 2.);
        assert_eq!(batch.rewards.data()[b * 2 + 1], 10.5 + b as f32 / 2.);
    }

    let expected_next_env0 = [
        [0., 20., 21., 22.],
        [20., 21., 22., 23.],
        [21., 22., 23., 0.],
        [0., 0., 24., 25.],
        [0., 24., 25., 26.],
        [24., 25., 26., 27.],
        [25., 26., 27., 28.],
        [26., 27., 28., 29.],
    ];
    let expected_next_env1 = [
        [200., 210., 220., 0.],
        [0., 0., 230., 240.],
        [0., 230., 240., 250.],
        [230., 240., 250., 260.],
        [240., 250., 260., 270.],
        [250., 260., 270., 280.],
        [260., 270., 280., 0.],
        [0., 0., 290., 300.],
    ];
    for b in 0..8 {
        assert_eq!(plane_max(&next_state(b, 0)), expected_next_env0[b]);
        assert_eq!(plane_max(&next_state(b, 1)), expected_next_env1[b]);
    }

    let bad_indexes: Vec<Vec<usize>> = (0..9).map(|b| vec![b, b + 1]).collect();
    assert!(buffer.get_batch(&bad_indexes, 4).is_err());
}

#[test]
fn sample_and_get_batch() {
    let buffer = filled_buffer_with_dones();
    let mut rng = StdRng::seed_from_u64(42);
    let mut any_env_difference = false;

    for _ in 0..100 {
        let indexes = buffer.sample_batch_uniform(5, 4, &mut rng).unwrap();
        assert_eq!(indexes.len(), 5);
        let batch = buffer.get_batch(&indexes, 4).unwrap();
        assert_eq!(batch.states.shape()[0], 5);
        assert_eq!(batch.next_states.shape()[0], 5);
        assert_eq!(batch.rewards.shape(), &[5, 2]);
        assert_eq!(batch.dones.len(), 10);
        any_env_difference |= indexes.iter().any(|row| row[0] != row[1]);
    }
    // environments sample their anchors independently
    assert!(any_env_difference);
}

#[test]
fn sample_rollout_half_filled() {
    let buffer = half_filled_buffer();
    let mut rng = StdRng::seed_from_u64(7);
    let mut seen = vec![];

    for _ in 0..1000 {
        let ends = buffer.sample_rollout(5, 4, &mut rng).unwrap();
        let rollout = buffer.get_rollout(&ends, 5, 4).unwrap();
        assert_eq!(rollout.states.shape()[0], 5);
        assert_eq!(*rollout.states.shape().last().unwrap(), 4);
        seen.extend(ends);
    }
    assert_eq!(*seen.iter().min().unwrap(), 4);
    assert_eq!(*seen.iter().max().unwrap(), 8);

    assert!(matches!(
        buffer.sample_rollout(10, 4, &mut rng),
        Err(BufferError::NotEnoughTransitions { .. })
    ));

    let ends = buffer.sample_rollout(9, 4, &mut rng).unwrap();
    assert_eq!(ends, vec![8, 8]);
    let rollout = buffer.get_rollout(&ends, 9, 4).unwrap();
    for step in 0..9 {
        let reward = step as f32 / 2.;
        assert_eq!(rollout.rewards.data()[step * 2], reward);
        assert_eq!(rollout.rewards.data()[step * 2 + 1], reward);
    }
}

#[test]
fn sample_rollout_filled() {
    let buffer = filled_buffer();
    let mut rng = StdRng::seed_from_u64(11);
    let mut seen = vec![];

    for _ in 0..1000 {
        let ends = buffer.sample_rollout(5, 4, &mut rng).unwrap();
        let rollout = buffer.get_rollout(&ends, 5, 4).unwrap();
        assert_eq!(rollout.states.shape()[0], 5);
        assert_eq!(*rollout.states.shape().last().unwrap(), 4);
        seen.extend(ends);
    }
    assert_eq!(*seen.iter().min().unwrap(), 0);
    assert_eq!(*seen.iter().max().unwrap(), 19);

    assert!(buffer.sample_rollout(17, 4, &mut rng).is_err());

    let ends = buffer.sample_rollout(16, 4, &mut rng).unwrap();
    assert_eq!(ends, vec![8, 8]);
    let rollout = buffer.get_rollout(&ends, 16, 4).unwrap();
    let total: f32 = rollout.rewards.data().iter().sum();
    assert!((total - 164. * 2.).abs() < 1e-4);
}

fn vector_item(i: usize, shape: Vec<usize>) -> Frame {
    // leading env axis; the first half of each env's features scales with
    // i + 1, the second half with 10 * (i + 1)
    let per_env: usize = shape[1..].iter().product();
    let mut data = vec![0.; 2 * per_env];
    for env in 0..2 {
        for s in 0..per_env {
            let scale = if s < per_env / 2 { 1. } else { 10. };
            data[env * per_env + s] = scale * (i + 1) as f32;
        }
    }
    Frame::new(data, shape)
}

fn arange_actions(i: usize, shape: Vec<usize>) -> Frame {
    let numel: usize = shape.iter().product();
    let data = (0..numel).map(|a| (a * i) as f32).collect();
    Frame::new(data, shape)
}

#[test]
fn buffer_flexible_obs_action_sizes() {
    let mut b1 = DequeMultiEnvBuffer::new(20, 2, vec![2], vec![2]);
    let mut b2 = DequeMultiEnvBuffer::new(20, 2, vec![2, 2], vec![2, 2]);
    let mut b3 = DequeMultiEnvBuffer::new(20, 2, vec![2, 2, 2], vec![2, 2, 2]);
    for i in 0..30 {
        let reward = i as f32 / 2.;
        b1.store_transition(
            &vector_item(i, vec![2, 2]),
            &arange_actions(i, vec![2, 2]),
            &[reward, reward],
            &[false, false],
        );
        b2.store_transition(
            &vector_item(i, vec![2, 2, 2]),
            &arange_actions(i, vec![2, 2, 2]),
            &[reward, reward],
            &[false, false],
        );
        b3.store_transition(
            &vector_item(i, vec![2, 2, 2, 2]),
            &arange_actions(i, vec![2, 2, 2, 2]),
            &[reward, reward],
            &[false, false],
        );
    }

    assert_eq!(b1.get_frame(0, 0, 1).unwrap().data(), &[21., 210.]);
    assert_eq!(b2.get_frame(0, 0, 1).unwrap().data(), &[21., 21., 210., 210.]);
    assert_eq!(
        b3.get_frame(0, 0, 1).unwrap().data(),
        &[21., 21., 21., 21., 210., 210., 210., 210.]
    );

    // actions at slot 0 carry step 20's arange pattern
    assert_eq!(b1.get_transition(0, 0, 1).unwrap().action.data(), &[0., 20.]);
    assert_eq!(
        b2.get_transition(0, 0, 1).unwrap().action.data(),
        &[0., 20., 40., 60.]
    );
    assert_eq!(
        b3.get_transition(0, 0, 1).unwrap().action.data(),
        &[0., 20., 40., 60., 80., 100., 120., 140.]
    );

    for buffer in [&b1, &b2, &b3] {
        assert!(matches!(
            buffer.get_frame(0, 0, 2),
            Err(BufferError::HistoryUnsupported)
        ));
        assert!(matches!(
            buffer.get_transition(0, 0, 2),
            Err(BufferError::HistoryUnsupported)
        ));
    }
}

#[test]
fn buffer_flexible_obs_action_sizes_with_history() {
    let mut b1 = DequeMultiEnvBuffer::new(20, 2, vec![2, 1], vec![2]);
    let mut b2 = DequeMultiEnvBuffer::new(20, 2, vec![2, 2, 1], vec![2, 2]);
    let mut b3 = DequeMultiEnvBuffer::new(20, 2, vec![2, 2, 2, 1], vec![2, 2, 2]);
    for i in 0..30 {
        let reward = i as f32 / 2.;
        b1.store_transition(
            &vector_item(i, vec![2, 2, 1]),
            &arange_actions(i, vec![2, 2]),
            &[reward, reward],
            &[false, false],
        );
        b2.store_transition(
            &vector_item(i, vec![2, 2, 2, 1]),
            &arange_actions(i, vec![2, 2, 2]),
            &[reward, reward],
            &[false, false],
        );
        b3.store_transition(
            &vector_item(i, vec![2, 2, 2, 2, 1]),
            &arange_actions(i, vec![2, 2, 2, 2]),
            &[reward, reward],
            &[false, false],
        );
    }

    assert_eq!(b1.get_frame(0, 0, 2).unwrap().data(), &[20., 21., 200., 210.]);
    assert_eq!(
        b2.get_frame(0, 0, 2).unwrap().data(),
        &[20., 21., 20., 21., 200., 210., 200., 210.]
    );
    assert_eq!(
        b3.get_frame(0, 0, 2).unwrap().data(),
        &[
            20., 21., 20., 21., 20., 21., 20., 21., 200., 210., 200., 210., 200., 210., 200., 210.
        ]
    );

    assert_eq!(
        b1.get_transition(0, 0, 2).unwrap().next_state.data(),
        &[21., 22., 210., 220.]
    );
    assert_eq!(
        b2.get_transition(0, 0, 2).unwrap().next_state.data(),
        &[21., 22., 21., 22., 210., 220., 210., 220.]
    );
    assert_eq!(
        b3.get_transition(0, 0, 2).unwrap().next_state.data(),
        &[
            21., 22., 21., 22., 21., 22., 21., 22., 210., 220., 210., 220., 210., 220., 210., 220.
        ]
    );
}
