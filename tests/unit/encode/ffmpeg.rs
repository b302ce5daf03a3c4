use super::*;
use crate::encode::sink::AudioInputConfig;

fn cfg(width: u32, height: u32, audio: bool) -> SinkConfig {
    SinkConfig {
        width,
        height,
        fps: Fps::new(30000, 1001).unwrap(),
        audio: audio.then(|| AudioInputConfig {
            path: PathBuf::from("/tmp/mix.f32le"),
            sample_rate: 48_000,
            channels: 2,
        }),
    }
}

#[test]
fn hw_encoder_pick_follows_preference_order() {
    let listing = " V....D h264_amf  AMD AMF H.264 Encoder\n V....D h264_qsv  H.264 (Intel Quick Sync)\n";
    assert_eq!(pick_hw_encoder(listing), Some(VideoCodec::Qsv));
    assert_eq!(
        pick_hw_encoder("V....D H264_NVENC NVIDIA\nV....D h264_qsv"),
        Some(VideoCodec::Nvenc)
    );
    assert_eq!(pick_hw_encoder(" V....D libx264 "), None);
}

#[test]
fn software_codec_is_default_without_probe() {
    assert_eq!(
        select_codec(false, Duration::from_millis(1)),
        VideoCodec::Libx264
    );
}

#[test]
fn codec_args_match_encoder() {
    let sw = VideoCodec::Libx264.output_args().join(" ");
    assert_eq!(
        sw,
        "-c:v libx264 -preset ultrafast -pix_fmt yuv420p -crf 22 -tune zerolatency -bf 0"
    );
    assert_eq!(
        VideoCodec::Nvenc.output_args().join(" "),
        "-c:v h264_nvenc -pix_fmt yuv420p"
    );
}

#[test]
fn faststart_only_for_mp4_family() {
    assert!(wants_faststart(Path::new("out.MP4")));
    assert!(wants_faststart(Path::new("a/b.m4v")));
    assert!(wants_faststart(Path::new("x.mov")));
    assert!(!wants_faststart(Path::new("x.mkv")));
    assert!(!wants_faststart(Path::new("noext")));
}

#[test]
fn command_with_audio_maps_pcm_and_aac() {
    let sink = FfmpegSink::new(FfmpegSinkOpts::new("/tmp/out.mp4"));
    let args = sink.command_args(&cfg(640, 360, true)).join(" ");
    assert!(args.starts_with(
        "-y -hide_banner -loglevel error -f rawvideo -pix_fmt rgb24 -s 640x360 -r 30000/1001 -i pipe:0"
    ));
    assert!(args.contains("-f f32le -ar 48000 -ac 2 -i /tmp/mix.f32le"));
    assert!(args.contains("-c:a aac -b:a 192k -shortest"));
    assert!(args.ends_with("-movflags +faststart /tmp/out.mp4"));
}

#[test]
fn command_without_audio_disables_audio_stream() {
    let mut opts = FfmpegSinkOpts::new("/tmp/out.mkv");
    opts.overwrite = false;
    let sink = FfmpegSink::new(opts);
    let args = sink.command_args(&cfg(64, 64, false));
    assert_eq!(args[0], "-n");
    assert!(args.contains(&"-an".to_owned()));
    assert!(!args.contains(&"+faststart".to_owned()));
    assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mkv"));
}

#[test]
fn odd_dimensions_are_rejected_before_spawning() {
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(std::env::temp_dir().join("never.mp4")));
    let err = sink.begin(cfg(641, 360, false)).unwrap_err();
    assert!(err.to_string().contains("must be even"));
}

#[test]
fn push_before_begin_is_an_encoder_error() {
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new("unused.mp4"));
    let frame = FrameRgb {
        width: 2,
        height: 2,
        data: vec![0; 12],
    };
    let err = sink.push_frame(FrameIndex(0), &frame).unwrap_err();
    assert!(matches!(err, ReelcastError::Encoder(_)));
}
