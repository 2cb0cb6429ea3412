#![no_main]

use libfuzzer_sys::fuzz_target;
use mjpeg_stream::{DemuxMode, FrameDemuxer};

fuzz_target!(|data: &[u8]| {
    let modes = [
        DemuxMode::Boundary("X-BOUNDARY".to_owned()),
        DemuxMode::BareJpeg,
    ];

    for mode in &modes {
        // Whole input at once.
        let mut whole = FrameDemuxer::new(mode.clone());
        let whole_frames = whole.push(data).ok();

        // Same input split into small chunks must never panic and, while
        // the demuxer stays healthy, must yield the same frames.
        let mut split = FrameDemuxer::new(mode.clone());
        let mut split_frames = Vec::new();
        let mut failed = false;
        for chunk in data.chunks(3) {
            match split.push(chunk) {
                Ok(frames) => split_frames.extend(frames),
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }

        if let (Some(whole_frames), false) = (whole_frames, failed) {
            let prefix_len = split_frames.len().min(whole_frames.len());
            assert_eq!(&whole_frames[..prefix_len], &split_frames[..prefix_len]);
        }
    }
});
