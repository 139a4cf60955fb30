//! Ghostscript command line construction.

use std::ffi::OsString;
use std::path::Path;

use super::preset::CompressionPreset;

/// PDF version written by the engine.
const COMPATIBILITY_LEVEL: &str = "1.4";

/// Arguments for compressing `input` into `output` with `preset`.
///
/// The named `-dPDFSETTINGS` distiller profile sets fonts and colour handling;
/// the explicit image options pin resolution and JPEG quality to the preset
/// table so every preset maps to exactly the values it advertises.
pub fn ghostscript_args(preset: CompressionPreset, input: &Path, output: &Path) -> Vec<OsString> {
    let dpi = preset.dpi();
    let mut args: Vec<OsString> = [
        "-sDEVICE=pdfwrite".to_string(),
        format!("-dCompatibilityLevel={}", COMPATIBILITY_LEVEL),
        format!("-dPDFSETTINGS=/{}", preset.id()),
        "-dNOPAUSE".to_string(),
        "-dQUIET".to_string(),
        "-dBATCH".to_string(),
        "-dSAFER".to_string(),
        "-dCompressFonts=true".to_string(),
        "-dSubsetFonts=true".to_string(),
        "-dDownsampleColorImages=true".to_string(),
        "-dDownsampleGrayImages=true".to_string(),
        "-dDownsampleMonoImages=true".to_string(),
        format!("-dColorImageResolution={}", dpi),
        format!("-dGrayImageResolution={}", dpi),
        format!("-dMonoImageResolution={}", dpi),
        "-dAutoFilterColorImages=false".to_string(),
        "-dAutoFilterGrayImages=false".to_string(),
        "-dColorImageFilter=/DCTEncode".to_string(),
        "-dGrayImageFilter=/DCTEncode".to_string(),
        format!("-dJPEGQ={}", preset.quality()),
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    let mut output_arg = OsString::from("-sOutputFile=");
    output_arg.push(output);
    args.push(output_arg);
    // `-f` ends switch parsing, so a source named like `-x.pdf` stays a file.
    args.push(OsString::from("-f"));
    args.push(input.as_os_str().to_owned());
    args
}

/// Numeric value of a `-dName=value` argument.
pub fn numeric_arg(args: &[OsString], name: &str) -> Option<u32> {
    let prefix = format!("-d{}=", name);
    args.iter()
        .filter_map(|a| a.to_str())
        .find_map(|a| a.strip_prefix(&prefix))
        .and_then(|v| v.parse().ok())
}
