use std::fs;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use trail_metrics::{
    parse_track, AnalysisOptions, MetricsReport, PointSequence, ReversalPolicy, SkillLevel,
    TrackAnalyzer, TrackSelection,
};

mod ascii_map;

#[derive(Parser, Debug)]
#[command(author, version, about = "Trail metrics for GPX/FIT tracks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute distance, ascent/descent and duration estimates for tracks
    Analyze(AnalyzeArgs),
    /// Summarise what a track file contains (points, elevation, timestamps)
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// GPX/FIT files or http(s) URLs to analyse; prompts on stdin when omitted
    #[arg(value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// JSON file with analysis options; flags below override it
    #[arg(long, value_hint = ValueHint::FilePath)]
    options: Option<PathBuf>,

    /// Track (or route) index inside each file
    #[arg(long, default_value_t = 0)]
    track: usize,

    /// Elevation noise threshold (meters)
    #[arg(long)]
    threshold: Option<f64>,

    /// Slope limit (percent) for the speed-based estimate
    #[arg(long)]
    slope_limit: Option<f64>,

    /// Flat speed (meters per hour)
    #[arg(long)]
    flat_speed: Option<f64>,

    /// Ascent speed (vertical meters per hour)
    #[arg(long)]
    asc_speed: Option<f64>,

    /// Descent speed (vertical meters per hour)
    #[arg(long)]
    desc_speed: Option<f64>,

    /// Meters of ascent equivalent to one flat kilometer
    #[arg(long)]
    asc_effort: Option<f64>,

    /// Meters of descent equivalent to one flat kilometer
    #[arg(long)]
    desc_effort: Option<f64>,

    /// Hiker level for the kilometer-effort estimate
    #[arg(long, value_enum)]
    skill: Option<SkillOpt>,

    /// Kilometer-effort per hour (overrides --skill)
    #[arg(long)]
    effort_per_hour: Option<f64>,

    /// Reference handling when elevation reverses past the threshold
    #[arg(long, value_enum)]
    reversal: Option<ReversalOpt>,

    /// Write reports as JSON (`-` for stdout)
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Write the per-point distance/elevation profile as CSV
    #[arg(long, value_hint = ValueHint::FilePath)]
    csv: Option<PathBuf>,

    /// Output PNG elevation profile
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG elevation profile
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Print an ASCII map of the track
    #[arg(long, action = ArgAction::SetTrue)]
    map: bool,

    /// ASCII map size as WIDTHxHEIGHT
    #[arg(long, default_value = "100x30")]
    map_size: String,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// GPX/FIT files or http(s) URLs to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Track (or route) index inside each file
    #[arg(long, default_value_t = 0)]
    track: usize,

    /// Output report path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SkillOpt {
    Beginner,
    Intermediate,
    Advanced,
}

impl From<SkillOpt> for SkillLevel {
    fn from(value: SkillOpt) -> Self {
        match value {
            SkillOpt::Beginner => SkillLevel::Beginner,
            SkillOpt::Intermediate => SkillLevel::Intermediate,
            SkillOpt::Advanced => SkillLevel::Advanced,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ReversalOpt {
    Reset,
    Rebase,
}

impl From<ReversalOpt> for ReversalPolicy {
    fn from(value: ReversalOpt) -> Self {
        match value {
            ReversalOpt::Reset => ReversalPolicy::Reset,
            ReversalOpt::Rebase => ReversalPolicy::Rebase,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Analyze(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let options = build_options(&args)?;
    let (map_width, map_height) = parse_map_size(&args.map_size)?;

    let inputs = if args.inputs.is_empty() {
        let stdin = io::stdin();
        prompt_for_inputs(stdin.lock(), io::stdout())?
    } else {
        args.inputs.clone()
    };
    if inputs.is_empty() {
        return Err(anyhow!("no input files supplied"));
    }

    let selection = TrackSelection { index: args.track };
    let multiple = inputs.len() > 1;
    let mut analysed: Vec<(PathBuf, MetricsReport)> = Vec::with_capacity(inputs.len());
    let mut profiles: Vec<(PathBuf, PointSequence)> = Vec::new();

    for path in &inputs {
        let t_parse = Instant::now();
        let points = load_track(path, selection)?;
        debug!(
            "Parse stage: {:.1} ms ({} points)",
            t_parse.elapsed().as_secs_f64() * 1000.0,
            points.len()
        );

        let mut analyzer = TrackAnalyzer::new(points, options.clone());
        let report = analyzer.analyse().clone();
        info!("Analysed {} ({} points)", path.display(), report.point_count);

        print!("{}", format_report(path, &report));
        if args.map {
            println!("{}", ascii_map::render(analyzer.points(), map_width, map_height));
        }

        let points = analyzer.into_points();
        if let Some(base) = args.png.as_ref() {
            let target = output_path_for(base, path, multiple);
            render_profile_guard(&points, path, &target, ChartKind::Png);
        }
        if let Some(base) = args.svg.as_ref() {
            let target = output_path_for(base, path, multiple);
            render_profile_guard(&points, path, &target, ChartKind::Svg);
        }
        if args.csv.is_some() {
            profiles.push((path.clone(), points));
        }
        analysed.push((path.clone(), report));
    }

    if let Some(csv_path) = args.csv.as_ref() {
        write_profile_csv(&profiles, csv_path)?;
        info!("Wrote profile CSV: {}", csv_path.display());
    }

    if let Some(json_path) = args.json.as_ref() {
        write_reports_json(&analysed, &options, json_path)?;
        if json_path.as_os_str() != "-" {
            info!("Wrote JSON report: {}", json_path.display());
        }
    }

    Ok(())
}

fn build_options(args: &AnalyzeArgs) -> Result<AnalysisOptions> {
    let mut options = match args.options.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read options {}", path.display()))?;
            AnalysisOptions::from_json(&text)
                .with_context(|| format!("invalid options file {}", path.display()))?
        }
        None => AnalysisOptions::default(),
    };

    if let Some(value) = args.threshold {
        options.elevation_diff_threshold = value;
    }
    if let Some(value) = args.slope_limit {
        options.slope_limit_percent = value;
    }
    if let Some(value) = args.flat_speed {
        options.flat_speed = value;
    }
    if let Some(value) = args.asc_speed {
        options.asc_speed = value;
    }
    if let Some(value) = args.desc_speed {
        options.desc_speed = value;
    }
    if let Some(value) = args.asc_effort {
        options.asc_effort_coefficient = value;
    }
    if let Some(value) = args.desc_effort {
        options.desc_effort_coefficient = value;
    }
    if let Some(skill) = args.skill {
        options = options.with_skill(skill.into());
    }
    if let Some(value) = args.effort_per_hour {
        options.effort_per_hour = value;
    }
    if let Some(reversal) = args.reversal {
        options.reversal_policy = reversal.into();
    }

    options.validate()?;
    Ok(options)
}

fn parse_map_size(input: &str) -> Result<(usize, usize)> {
    let (w, h) = input
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("invalid map size '{}': expected WIDTHxHEIGHT", input))?;
    let width: usize = w
        .trim()
        .parse()
        .with_context(|| format!("invalid map width '{}'", w))?;
    let height: usize = h
        .trim()
        .parse()
        .with_context(|| format!("invalid map height '{}'", h))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("map size must be at least 1x1"));
    }
    Ok((width, height))
}

/// Ask for paths one per line until a blank line or end of input.
fn prompt_for_inputs<R: BufRead, W: Write>(mut reader: R, mut out: W) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    loop {
        write!(out, "Enter GPX/FIT path or URL (blank to finish): ")?;
        out.flush()?;
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim().trim_matches('"');
        if trimmed.is_empty() {
            break;
        }
        paths.push(PathBuf::from(trimmed));
    }
    writeln!(out)?;
    Ok(paths)
}

const FETCH_TIMEOUT_SECS: u64 = 30;

/// Where a track input comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
enum TrackSource {
    Local(PathBuf),
    Remote(String),
}

impl TrackSource {
    fn classify(input: &Path) -> Self {
        let text = input.to_string_lossy();
        let lower = text.trim().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            TrackSource::Remote(text.trim().to_string())
        } else {
            TrackSource::Local(input.to_path_buf())
        }
    }
}

fn load_track(input: &Path, selection: TrackSelection) -> Result<PointSequence> {
    let (data, hint) = match TrackSource::classify(input) {
        TrackSource::Local(path) => {
            let data =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let hint = path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("gpx")
                .to_string();
            (data, hint)
        }
        TrackSource::Remote(url) => fetch_track(&url)?,
    };
    parse_track(&data, &hint, selection)
        .with_context(|| format!("failed to parse {}", input.display()))
}

fn fetch_track(url: &str) -> Result<(Vec<u8>, String)> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
        .context("failed to build HTTP client")?;
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("failed to fetch {}", url))?
        .error_for_status()
        .with_context(|| format!("failed to fetch {}", url))?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .with_context(|| format!("failed to read response body from {}", url))?;
    let hint = hint_from_url(url)
        .or_else(|| content_type.as_deref().and_then(hint_from_content_type))
        .unwrap_or("gpx");
    debug!(
        "Fetched {} ({} bytes, content-type {:?}, format {})",
        url,
        bytes.len(),
        content_type,
        hint
    );
    Ok((bytes.to_vec(), hint.to_string()))
}

/// Format from the extension of the URL's last path segment.
fn hint_from_url(url: &str) -> Option<&'static str> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_, path) = after_scheme.split_once('/')?;
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "gpx" => Some("gpx"),
        "fit" => Some("fit"),
        _ => None,
    }
}

fn hint_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if mime.contains("gpx") || mime.ends_with("/xml") {
        Some("gpx")
    } else if mime.contains("fit") {
        Some("fit")
    } else {
        None
    }
}

fn format_report(path: &Path, report: &MetricsReport) -> String {
    let elevation = |value: Option<f64>| {
        value
            .map(|v| format!("{:.0} m", v))
            .unwrap_or_else(|| "n/a".into())
    };
    let mut out = String::new();
    out.push_str(&format!("{}\n", path.display()));
    out.push_str(&format!(
        "  distance            : {:.2} km\n",
        report.total_length / 1000.0
    ));
    out.push_str(&format!(
        "  ascent              : {:.2} m over {:.2} km\n",
        report.positive_height_diff,
        report.ascent_distance / 1000.0
    ));
    out.push_str(&format!(
        "  descent             : {:.2} m over {:.2} km\n",
        report.negative_height_diff,
        report.descent_distance / 1000.0
    ));
    out.push_str(&format!("  max elevation       : {}\n", elevation(report.max_elevation)));
    out.push_str(&format!("  min elevation       : {}\n", elevation(report.min_elevation)));
    out.push_str(&format!(
        "  estimated (speed)   : {}\n",
        format_duration(report.estimated_duration_by_speed)
    ));
    out.push_str(&format!(
        "  estimated (effort)  : {} ({:.1} km-effort)\n",
        format_duration(report.estimated_duration_by_effort),
        report.kilometer_effort
    ));
    out.push_str(&format!(
        "  recorded            : {}\n",
        report
            .real_duration
            .map(format_duration)
            .unwrap_or_else(|| "n/a".into())
    ));
    out
}

fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// With several inputs each output file gets the input's stem appended.
fn output_path_for(base: &Path, input: &Path, multiple: bool) -> PathBuf {
    if !multiple {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "profile".into());
    let input_stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "track".into());
    let mut name = format!("{}_{}", stem, input_stem);
    if let Some(ext) = base.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    base.with_file_name(name)
}

fn write_profile_csv(profiles: &[(PathBuf, PointSequence)], path: &Path) -> Result<()> {
    if path.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        return write_profile_rows(profiles, &mut writer);
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_profile_rows(profiles, &mut writer)
}

fn write_profile_rows<W: Write>(
    profiles: &[(PathBuf, PointSequence)],
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    writer.write_record([
        "file",
        "index",
        "latitude",
        "longitude",
        "elevation_m",
        "distance_from_start_m",
        "time",
    ])?;

    for (source, points) in profiles {
        let source = source.display().to_string();
        for (index, point) in points.iter().enumerate() {
            writer.write_record([
                source.clone(),
                index.to_string(),
                format!("{:.7}", point.latitude),
                format!("{:.7}", point.longitude),
                point
                    .elevation
                    .map(|v| format!("{:.2}", v))
                    .unwrap_or_else(|| "".into()),
                format!("{:.3}", point.distance_from_start()),
                point.time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "".into()),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

fn write_reports_json(
    analysed: &[(PathBuf, MetricsReport)],
    options: &AnalysisOptions,
    path: &Path,
) -> Result<()> {
    let reports: Vec<_> = analysed
        .iter()
        .map(|(file, report)| json!({ "file": file.display().to_string(), "report": report }))
        .collect();
    let doc = json!({ "options": options, "tracks": reports });
    let text = serde_json::to_string_pretty(&doc)?;
    if path.as_os_str() == "-" {
        println!("{}", text);
    } else {
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let selection = TrackSelection { index: args.track };
    let mut report = String::new();

    for path in &args.inputs {
        let points = load_track(path, selection)?;
        let with_elevation = points.iter().filter(|p| p.elevation.is_some()).count();
        let with_time = points.iter().filter(|p| p.time.is_some()).count();

        report.push_str(&format!("FILE: {}\n", path.display()));
        report.push_str(&format!("  points: {}\n", points.len()));
        report.push_str(&format!("  with_elevation: {}\n", with_elevation));
        report.push_str(&format!("  with_time: {}\n", with_time));
        report.push_str(&format!("  length_m: {:.1}\n", points.length()));
        if let (Some(lo), Some(hi)) = (points.min_elevation(), points.max_elevation()) {
            report.push_str(&format!("  elevation_m: {:.1} .. {:.1}\n", lo, hi));
        }
        let first_time = points.iter().find_map(|p| p.time);
        let last_time = points.iter().rev().find_map(|p| p.time);
        if let (Some(start), Some(end)) = (first_time, last_time) {
            report.push_str(&format!("  first_time: {}\n", start.to_rfc3339()));
            report.push_str(&format!("  last_time: {}\n", end.to_rfc3339()));
            report.push_str(&format!("  timespan_s: {}\n", (end - start).num_seconds()));
        }
        if let Some(b) = points.bounds() {
            report.push_str(&format!(
                "  bounds: lat {:.6} .. {:.6}, lon {:.6} .. {:.6}\n",
                b.min_lat, b.max_lat, b.min_lon, b.max_lon
            ));
        }
        report.push('\n');
    }

    if args.output.as_os_str() == "-" {
        print!("{}", report);
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Inspection report written: {}", args.output.display());
    }
    Ok(())
}

enum ChartKind {
    Png,
    Svg,
}

/// Render the elevation profile. Backend errors and panics are logged and skipped.
fn render_profile_guard(points: &PointSequence, source: &Path, target: &Path, kind: ChartKind) {
    let profile: Vec<(f64, f64)> = points
        .iter()
        .filter_map(|p| Some((p.distance_from_start() / 1000.0, p.elevation?)))
        .collect();
    if profile.len() < 2 {
        warn!(
            "Skipping profile plot for {}: not enough elevation data",
            source.display()
        );
        return;
    }
    let title = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Elevation profile".into());

    let t_plot = Instant::now();
    let render = || -> Result<(), String> {
        match kind {
            ChartKind::Png => {
                let root = BitMapBackend::new(target, (1280, 600)).into_drawing_area();
                draw_profile(root, &profile, &title)
            }
            ChartKind::Svg => {
                let root = SVGBackend::new(target, (1280, 600)).into_drawing_area();
                draw_profile(root, &profile, &title)
            }
        }
    };

    let outcome = panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())
        .and_then(|r| r);
    match outcome {
        Ok(()) => {
            info!("Wrote plot: {}", target.display());
            debug!(
                "Plot stage: {:.1} ms",
                t_plot.elapsed().as_secs_f64() * 1000.0
            );
        }
        Err(err) => warn!("Skipping plot render ({}): {}", target.display(), err),
    }
}

fn draw_profile<DB>(
    root: DrawingArea<DB, Shift>,
    profile: &[(f64, f64)],
    title: &str,
) -> Result<(), String>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let x_max = profile
        .iter()
        .map(|(x, _)| *x)
        .fold(f64::MIN, f64::max)
        .max(0.001);
    let y_min = profile.iter().map(|(_, y)| *y).fold(f64::MAX, f64::min);
    let y_max = profile.iter().map(|(_, y)| *y).fold(f64::MIN, f64::max);
    let pad = ((y_max - y_min) * 0.05).max(5.0);

    root.fill(&WHITE).map_err(|e| e.to_string())?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(16)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..x_max, (y_min - pad)..(y_max + pad))
        .map_err(|e| e.to_string())?;

    chart
        .configure_mesh()
        .x_desc("Distance (km)")
        .y_desc("Elevation (m)")
        .draw()
        .map_err(|e| e.to_string())?;

    chart
        .draw_series(LineSeries::new(profile.iter().copied(), &RGBColor(30, 144, 255)))
        .map_err(|e| e.to_string())?;

    root.present().map_err(|e| e.to_string())?;
    Ok(())
}
