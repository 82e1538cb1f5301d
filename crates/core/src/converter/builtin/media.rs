//! FFmpeg audio and video transcoding.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static AUDIO_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("audio", &["audio"], &["mp3", "wav", "flac"])
        .dependency("ffmpeg", &["ffmpeg"])
        .timeout_secs(1800)
});

static VIDEO_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("video", &["video"], &["mpeg2", "h264", "h264-mpg", "h265"])
        .dependency("ffmpeg", &["ffmpeg"])
        .timeout_secs(7200)
});

fn audio_descriptor() -> &'static ConverterDescriptor {
    &AUDIO_DESCRIPTOR
}

fn video_descriptor() -> &'static ConverterDescriptor {
    &VIDEO_DESCRIPTOR
}

fn build_audio(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(AudioConverter { base })
}

fn build_video(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(VideoConverter { base })
}

pub const AUDIO: ConverterType = ConverterType::new(audio_descriptor, build_audio);
pub const VIDEO: ConverterType = ConverterType::new(video_descriptor, build_video);

/// Audio targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Flac,
}

impl AudioFormat {
    pub fn from_output(output: &str) -> Option<Self> {
        match output {
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "flac" => Some(Self::Flac),
            _ => None,
        }
    }

    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "pcm_s16le",
            Self::Flac => "flac",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
        }
    }
}

/// Video targets. All but MPEG-2 are written as MP4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    Mpeg2,
    H264,
    /// H.264 in an MP4 container, saved with an `.mpg` extension.
    H264Mpg,
    H265,
}

impl VideoFormat {
    pub fn from_output(output: &str) -> Option<Self> {
        match output {
            "mpeg2" => Some(Self::Mpeg2),
            "h264" => Some(Self::H264),
            "h264-mpg" => Some(Self::H264Mpg),
            "h265" => Some(Self::H265),
            _ => None,
        }
    }

    /// Codec arguments for video and audio streams.
    fn codec_args(&self) -> &'static [&'static str] {
        match self {
            Self::Mpeg2 => &["-c:v", "mpeg2video", "-c:a", "mp3"],
            Self::H264 | Self::H264Mpg => &["-c:v", "libx264", "-c:a", "aac"],
            Self::H265 => &["-c:v", "libx265", "-c:a", "aac", "-vtag", "hvc1"],
        }
    }

    /// Extension ffmpeg writes, which picks the container.
    fn container_extension(&self) -> &'static str {
        match self {
            Self::Mpeg2 => "mpg",
            _ => "mp4",
        }
    }

    /// Extension of the placed file.
    fn final_extension(&self) -> &'static str {
        match self {
            Self::Mpeg2 | Self::H264Mpg => "mpg",
            _ => "mp4",
        }
    }
}

/// Arguments shared by every ffmpeg run: input, no stdin, errors and stats only.
fn common_args(input: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        path_arg(input),
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-stats".to_string(),
    ]
}

/// Builds ffmpeg arguments for audio conversion.
fn build_audio_args(input: &Path, format: AudioFormat, dest_name: &str) -> Vec<String> {
    let mut args = common_args(input);
    // Drop video streams such as embedded cover art.
    args.push("-vn".to_string());
    args.extend(["-c:a".to_string(), format.ffmpeg_codec().to_string()]);
    args.push(dest_name.to_string());
    args
}

/// Builds ffmpeg arguments for video conversion.
fn build_video_args(input: &Path, format: VideoFormat, dest_name: &str) -> Vec<String> {
    let mut args = common_args(input);
    args.extend(format.codec_args().iter().map(|a| a.to_string()));
    args.push(dest_name.to_string());
    args
}

pub struct AudioConverter {
    base: ConverterBase,
}

#[async_trait]
impl Converter for AudioConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        match output {
            "mp3" => Some("fmt/134"),
            _ => None,
        }
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        let format = AudioFormat::from_output(output).ok_or_else(|| ConverterError::OutputTarget {
            output: output.to_string(),
        })?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = self.base.output_file(&dest_dir, format.extension());
        let dest_name = format!("{}.{}", self.base.file.stem(), format.extension());

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let args = build_audio_args(&self.base.input_path()?, format, &dest_name);
        self.base.run("ffmpeg", &args, Some(tmp_dir.path())).await?;

        Ok(vec![
            place_file(&tmp_dir.path().join(&dest_name), &dest_file).await?,
        ])
    }
}

pub struct VideoConverter {
    base: ConverterBase,
}

#[async_trait]
impl Converter for VideoConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        let format = VideoFormat::from_output(output).ok_or_else(|| ConverterError::OutputTarget {
            output: output.to_string(),
        })?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = self.base.output_file(&dest_dir, format.final_extension());
        let tmp_name = format!("{}.{}", self.base.file.stem(), format.container_extension());

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let args = build_video_args(&self.base.input_path()?, format, &tmp_name);
        self.base.run("ffmpeg", &args, Some(tmp_dir.path())).await?;

        Ok(vec![
            place_file(&tmp_dir.path().join(&tmp_name), &dest_file).await?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_audio_args_mp3() {
        let args = build_audio_args(Path::new("/input.wav"), AudioFormat::Mp3, "input.mp3");
        assert_eq!(
            args,
            vec![
                "-i", "/input.wav", "-nostdin", "-loglevel", "error", "-stats", "-vn", "-c:a",
                "mp3", "input.mp3"
            ]
        );
    }

    #[test]
    fn test_build_audio_args_wav() {
        let args = build_audio_args(Path::new("/input.mp3"), AudioFormat::Wav, "input.wav");
        assert!(args.contains(&"pcm_s16le".to_string()));
        assert_eq!(args.last().unwrap(), "input.wav");
    }

    #[test]
    fn test_build_video_args() {
        let args = build_video_args(Path::new("/input.mov"), VideoFormat::H265, "input.mp4");
        assert!(args.contains(&"libx265".to_string()));
        assert!(args.contains(&"hvc1".to_string()));
        assert!(!args.contains(&"-vn".to_string()));
        assert_eq!(args.last().unwrap(), "input.mp4");
    }

    #[test]
    fn test_video_extensions() {
        assert_eq!(VideoFormat::Mpeg2.container_extension(), "mpg");
        assert_eq!(VideoFormat::H264.final_extension(), "mp4");
        assert_eq!(VideoFormat::H264Mpg.container_extension(), "mp4");
        assert_eq!(VideoFormat::H264Mpg.final_extension(), "mpg");
    }

    #[test]
    fn test_every_output_has_a_format() {
        for output in &audio_descriptor().outputs {
            assert!(AudioFormat::from_output(output).is_some());
        }
        for output in &video_descriptor().outputs {
            assert!(VideoFormat::from_output(output).is_some());
        }
    }
}
