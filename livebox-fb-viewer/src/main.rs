use clap::Parser;
use livebox_fb::{Config, FrameBuffer, Region, TransportContext};

/// Acquire a widget frame buffer and report on its contents
#[derive(Parser, Debug)]
#[command(name = "livebox-fb-viewer", version)]
struct Cli {
    /// Buffer identifier, such as file:///path, pixmap://<id>[:<depth>] or shm://<id>
    identifier: String,

    /// Surface width in pixels
    width: u32,

    /// Surface height in pixels
    height: u32,

    /// Region to sync after acquiring, as four numbers
    #[arg(num_args = 4, value_names = ["X", "Y", "W", "H"], conflicts_with = "region")]
    rect: Option<Vec<u32>>,

    /// Region to sync after acquiring
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_region)]
    region: Option<Region>,
}

impl Cli {
    fn sync_region(&self) -> Option<Region> {
        match self.rect.as_deref() {
            Some(&[x, y, w, h]) => Some(Region::new(x, y, w, h)),
            _ => self.region,
        }
    }
}

fn parse_region(s: &str) -> Result<Region, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<u32>().map_err(|e| format!("{:?}: {}", p, e)))
        .collect::<Result<Vec<_>, _>>()?;
    match parts[..] {
        [x, y, w, h] => Ok(Region::new(x, y, w, h)),
        _ => Err(format!("expected X,Y,W,H, got {} values", parts.len())),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut ctx = TransportContext::new(Config::from_env());
    let fb = FrameBuffer::create(&cli.identifier, cli.width, cli.height)?;
    println!(
        "{}: {:?} transport, {} bytes, ready: {}",
        fb.identifier(),
        fb.transport_kind(),
        fb.byte_size(),
        fb.is_ready()
    );
    let pixels = fb.acquire(&mut ctx)?;
    if let Some(region) = cli.sync_region() {
        log::info!("syncing {:?}", region);
        fb.sync(&mut ctx, region)?;
    }
    let bytes = pixels.to_vec()?;
    let checksum = bytes
        .iter()
        .fold(0u32, |sum, &b| sum.rotate_left(5) ^ u32::from(b));
    println!(
        "{} bytes, checksum {:#010x}, {} references",
        bytes.len(),
        checksum,
        pixels.reference_count()?
    );
    pixels.release()?;
    fb.destroy();
    Ok(())
}
