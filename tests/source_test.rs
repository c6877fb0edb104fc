use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, Rgb, RgbImage, Rgba, RgbaImage};
use planar_tracker::error::TrackerError;
use planar_tracker::source::{FrameSource, SourceKind, SourceOpener, SystemOpener, open_file};
use tempfile::TempDir;

#[test]
fn test_image_sequence_plays_in_name_order() {
    let dir = TempDir::new().unwrap();
    for (name, v) in [("b.png", 20u8), ("a.png", 10), ("c.jpg", 30)] {
        RgbImage::from_pixel(8, 6, Rgb([v, v, v]))
            .save(dir.path().join(name))
            .unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let mut source = open_file(dir.path()).unwrap();
    assert_eq!(source.kind(), SourceKind::File);
    assert_eq!(source.len_hint(), Some(3));
    let first = source.read_frame().unwrap().unwrap();
    assert_eq!(first.get_pixel(0, 0), &Rgb([10, 10, 10]));
    let second = source.read_frame().unwrap().unwrap();
    assert_eq!(second.get_pixel(0, 0), &Rgb([20, 20, 20]));
    assert!(source.read_frame().unwrap().is_some());
    assert!(source.read_frame().unwrap().is_none());
}

#[test]
fn test_empty_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        open_file(dir.path()),
        Err(TrackerError::UnsupportedSource { .. })
    ));
}

#[test]
fn test_unknown_container_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.xyz");
    std::fs::write(&path, b"RIFF").unwrap();
    assert!(matches!(
        SystemOpener.open_file(&path),
        Err(TrackerError::UnsupportedSource { .. })
    ));
    assert!(open_file(&dir.path().join("absent.gif")).is_err());
    assert!(open_file(&dir.path().join("absent.mp4")).is_err());
}

#[cfg(not(feature = "video"))]
#[test]
fn test_video_containers_need_feature() {
    let dir = TempDir::new().unwrap();
    for name in ["clip.mp4", "clip.AVI", "clip.mkv", "clip.mov"] {
        let path = dir.path().join(name);
        std::fs::write(&path, b"RIFF").unwrap();
        match open_file(&path) {
            Err(TrackerError::UnsupportedSource { reason, .. }) => {
                assert!(reason.contains("`video` feature"), "{}", reason)
            }
            Err(e) => panic!("unexpected error for {}: {}", name, e),
            Ok(_) => panic!("{} opened without a decoder", name),
        }
    }
}

#[cfg(feature = "video")]
#[test]
fn test_corrupt_video_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.avi");
    std::fs::write(&path, b"RIFF").unwrap();
    assert!(matches!(
        SystemOpener.open_file(&path),
        Err(TrackerError::UnsupportedSource { .. })
    ));
}

#[cfg(feature = "video")]
#[test]
fn test_video_file_plays_to_end() {
    use gstreamer::prelude::*;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.avi");
    gstreamer::init().unwrap();
    let encoder = gstreamer::parse::launch(&format!(
        "videotestsrc num-buffers=5 ! video/x-raw,width=64,height=48 ! jpegenc ! avimux ! \
         filesink location=\"{}\"",
        path.display()
    ))
    .unwrap();
    encoder.set_state(gstreamer::State::Playing).unwrap();
    let bus = encoder.bus().unwrap();
    bus.timed_pop_filtered(
        gstreamer::ClockTime::from_seconds(10),
        &[gstreamer::MessageType::Eos, gstreamer::MessageType::Error],
    )
    .unwrap();
    encoder.set_state(gstreamer::State::Null).unwrap();

    let mut source = open_file(&path).unwrap();
    assert_eq!(source.kind(), SourceKind::File);
    let mut frames = 0;
    while let Some(frame) = source.read_frame().unwrap() {
        assert_eq!(frame.dimensions(), (64, 48));
        frames += 1;
    }
    assert_eq!(frames, 5);
    assert!(source.read_frame().unwrap().is_none());
}

#[test]
fn test_gif_frames_are_decoded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.gif");
    {
        let file = std::fs::File::create(&path).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames = [Rgba([255, 0, 0, 255]), Rgba([0, 0, 255, 255])].map(|c| {
            let delay = Delay::from_numer_denom_ms(40, 1);
            Frame::from_parts(RgbaImage::from_pixel(10, 10, c), 0, 0, delay)
        });
        encoder.encode_frames(frames).unwrap();
    }

    let mut source = open_file(&path).unwrap();
    let first = source.read_frame().unwrap().unwrap();
    assert_eq!(first.dimensions(), (10, 10));
    assert!(first.get_pixel(5, 5)[0] > 200);
    let second = source.read_frame().unwrap().unwrap();
    assert!(second.get_pixel(5, 5)[2] > 200);
    assert!(source.read_frame().unwrap().is_none());
}

#[cfg(not(feature = "camera"))]
#[test]
fn test_camera_needs_feature() {
    assert!(matches!(
        SystemOpener.open_camera(0),
        Err(TrackerError::CameraUnavailable { index: 0, .. })
    ));
}
