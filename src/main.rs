//! Crown segmentation from a LiDAR point CSV.
//!
//! Usage:
//!   cargo run --release -- points.csv
//!   cargo run --release -- points.csv --bbox 122564.2,490367.9,122581.3,490388.9 --points-out colored.csv
//!
//! Produces:
//!   crowns.csv — id, cluster, mean_z, n_points, nx, ny, nz, coplanar, hag, area, crown_wkt

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use crownseg::color::color_points;
use crownseg::io::{read_points, write_colored_points, CrownSink, CsvCrownSink};
use crownseg::{crown_detection, BoundingBox, HeightTransform, SegmentationParams};

#[derive(Parser, Debug)]
#[command(
    name = "crownseg",
    about = "Tree crown segmentation from attributed LiDAR points",
    after_help = "Produces: crowns.csv — id, cluster, mean_z, n_points, nx, ny, nz, coplanar, hag, area, crown_wkt"
)]
struct Cli {
    /// Input point CSV (X, Y, Z, Classification, ReturnNumber, NumberOfReturns, ...)
    #[arg(value_name = "POINTS.csv")]
    points: PathBuf,

    /// TOML parameter file; flags below override it
    #[arg(long, value_name = "params.toml")]
    config: Option<PathBuf>,

    /// Area of interest: xmin,ymin,xmax,ymax
    #[arg(long, value_delimiter = ',', num_args = 4, allow_hyphen_values = true)]
    bbox: Option<Vec<f64>>,

    /// HDBSCAN minimum cluster size
    #[arg(long)]
    min_cluster_size: Option<usize>,

    /// HDBSCAN minimum samples
    #[arg(long)]
    min_samples: Option<usize>,

    /// Cluster on XYZ instead of XY
    #[arg(long)]
    xyz: bool,

    /// Allow the whole area to form a single cluster
    #[arg(long)]
    single_cluster: bool,

    /// Peak separation in raster cells (integer)
    #[arg(long)]
    min_dist: Option<f64>,

    /// Peak raster cell size (map units)
    #[arg(long)]
    round_val: Option<f64>,

    /// Relative peak threshold in [0, 1]
    #[arg(long)]
    relative_threshold: Option<f64>,

    /// Rasterize raw heights instead of squared heights
    #[arg(long)]
    raw_height: bool,

    /// Skip the normal/coplanarity refinement pass
    #[arg(long)]
    no_refine: bool,

    /// Crown CSV output
    #[arg(long, short, default_value = "crowns.csv")]
    output: PathBuf,

    /// Optional coloured point CSV output
    #[arg(long, value_name = "colored.csv")]
    points_out: Option<PathBuf>,
}

impl Cli {
    fn params(&self) -> anyhow::Result<SegmentationParams> {
        let mut params = match &self.config {
            Some(path) => SegmentationParams::from_toml_file(path)
                .with_context(|| format!("reading {}", path.display()))?,
            None => SegmentationParams::default(),
        };
        if let Some(v) = self.min_cluster_size {
            params.min_cluster_size = v;
        }
        if let Some(v) = self.min_samples {
            params.min_samples = v;
        }
        if self.xyz {
            params.use_3d = true;
        }
        if self.single_cluster {
            params.allow_single_cluster = true;
        }
        if let Some(v) = self.min_dist {
            params.min_dist = v;
        }
        if let Some(v) = self.round_val {
            params.round_val = v;
        }
        if let Some(v) = self.relative_threshold {
            params.relative_threshold = v;
        }
        if self.raw_height {
            params.height_transform = HeightTransform::Raw;
        }
        if self.no_refine {
            params.refine.enabled = false;
        }
        params.validate()?;
        Ok(params)
    }

    fn bbox(&self) -> anyhow::Result<Option<BoundingBox>> {
        match self.bbox.as_deref() {
            None => Ok(None),
            Some(&[xmin, ymin, xmax, ymax]) => Ok(Some(BoundingBox::new(xmin, ymin, xmax, ymax))),
            Some(other) => bail!("--bbox needs 4 values, got {}", other.len()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let params = cli.params()?;
    let bbox = cli.bbox()?;

    println!("══════════════════════════════════════════════════════════");
    println!("  crownseg — tree crown segmentation");
    println!("══════════════════════════════════════════════════════════\n");

    println!("1. Loading '{}'...", cli.points.display());
    let cloud = read_points(&cli.points).with_context(|| format!("reading {}", cli.points.display()))?;
    println!("   {} points", cloud.len());
    if let Some(b) = &bbox {
        println!(
            "   area ({:.2}, {:.2}) – ({:.2}, {:.2}) = {:.1} m²",
            b.xmin,
            b.ymin,
            b.xmax,
            b.ymax,
            b.area()
        );
    }

    println!("2. Parameters:");
    println!(
        "   min_cluster_size={}  min_samples={}  {}  round_val={:.2}  min_dist={}",
        params.min_cluster_size,
        params.min_samples,
        if params.use_3d { "xyz" } else { "xy" },
        params.round_val,
        params.min_dist_cells()
    );
    println!();

    println!("3. Segmenting...");
    let t0 = std::time::Instant::now();
    let result = crown_detection(&cloud, &params, bbox.as_ref())?;
    println!(
        "   ✓ {} crowns ({} tree tops) in {:.2}s\n",
        result.crowns.len(),
        result.tree_tops().len(),
        t0.elapsed().as_secs_f64()
    );

    if !result.crowns.is_empty() {
        let mut sorted = result.crowns.clone();
        sorted.sort_by(|a, b| b.mean_z.total_cmp(&a.mean_z));
        println!("4. Tallest crowns:");
        println!(
            "   {:>4}  {:>7}  {:>8}  {:>8}  {:>6}",
            "ID", "Cluster", "Z mean", "Area m²", "Points"
        );
        println!("   {}", "─".repeat(42));
        for c in sorted.iter().take(10) {
            println!(
                "   {:>4}  {:>7}  {:>8.2}  {:>8.1}  {:>6}",
                c.id, c.cluster, c.mean_z, c.area, c.n_points
            );
        }
    }

    println!("\n5. Export → '{}'", cli.output.display());
    let mut sink = CsvCrownSink::create(&cli.output)
        .with_context(|| format!("creating {}", cli.output.display()))?;
    sink.write_crowns(&result.crowns)?;
    println!("   {} rows written.", result.crowns.len());

    if let Some(path) = &cli.points_out {
        let colored = color_points(&result.cloud, &result.point_labels);
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        write_colored_points(BufWriter::new(file), &colored)?;
        println!("   {} coloured points → '{}'", colored.len(), path.display());
    }

    println!("\n══════════════════════════════════════════════════════════");
    println!("  ✓ Done — {} crowns", result.crowns.len());
    println!("══════════════════════════════════════════════════════════");
    Ok(())
}
