mod acquire;
mod cli;
mod config;
mod device;
mod driver;
mod error;
mod serial;
mod session;
mod trigger;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::Parser;

use config::ConfigKey;
use device::{channel_index, Device};
use driver::ScanOptions;
use serial::SerialPortLink;
use session::{Datafeed, Session};
use trigger::{apply_trigger, TriggerSpec};

fn main() {
    env_logger::init();

    let opt = cli::Opt::parse();
    match opt.action {
        cli::Action::Scan(args) => do_scan_action(args),
        cli::Action::Record(args) => do_record_action(args),
    }
}

fn scan_device(connection: &cli::ConnectionArgs) -> Device {
    let options = ScanOptions {
        conn: connection.device.clone(),
        serialcomm: Some(connection.serialcomm.clone()),
    };
    match driver::scan(&options) {
        Ok(Some(device)) => device,
        Ok(None) => {
            eprintln!("No logic analyzer found on {}.", options.conn);
            std::process::exit(1)
        }
        Err(err) => {
            eprintln!("Could not probe {}: {}", options.conn, err);
            std::process::exit(1)
        }
    }
}

fn do_scan_action(args: cli::ScanArgs) {
    let device = scan_device(&args.connection);
    let info = &device.info;
    let channels: Vec<&str> = device.channels.iter().map(|ch| ch.name).collect();
    println!("{} {} on {}", info.name, info.version, device.conn);
    println!("  channels:        {}", channels.join(", "));
    println!("  max sample rate: {} Hz", info.max_samplerate);
    match device.samplerate_list() {
        Ok(rates) => {
            let rates: Vec<String> = rates.iter().map(|r| r.to_string()).collect();
            println!("  sample rates:    {} Hz", rates.join(", "));
        }
        Err(_) => println!("  sample rates:    unknown"),
    }
    match device.limit_samples_range() {
        Ok((min, max)) => println!("  sample counts:   {min}-{max}"),
        Err(_) => println!("  sample counts:   unknown"),
    }
    let matches: Vec<String> = config::TRIGGER_MATCHES
        .iter()
        .map(|m| format!("{m:?}").to_lowercase())
        .collect();
    println!("  trigger matches: {}", matches.join(", "));
}

fn do_record_action(args: cli::RecordArgs) {
    let mut device = scan_device(&args.connection);

    if let Err(err) = configure_device(&mut device, &args) {
        eprintln!("{err}");
        std::process::exit(1)
    }

    let trigger = if args.triggers.is_empty() {
        None
    } else {
        match TriggerSpec::parse_args(&args.triggers) {
            Ok(spec) => Some(spec),
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1)
            }
        }
    };
    if let Err(err) = apply_trigger(&mut device, trigger.as_ref()) {
        eprintln!("{err}");
        std::process::exit(1)
    }

    let link = match SerialPortLink::open(&device.conn, device.line) {
        Ok(link) => link,
        Err(err) => {
            eprintln!("Could not reopen {}: {}", device.conn, err);
            std::process::exit(1)
        }
    };

    let mut sink = match CaptureWriter::create(&args.output) {
        Ok(sink) => sink,
        Err(err) => {
            eprintln!("Could not create {:?}: {}", args.output, err);
            std::process::exit(1)
        }
    };

    // On Ctrl+C the event loop stops the acquisition and the device is told
    // to stop sampling; a second Ctrl+C terminates as usual.
    let (cancel_sender, cancel_receiver) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = cancel_sender.try_send(());
    })
    .expect("cannot register signal handler");

    let mut session = Session::new();
    if let Err(err) = driver::acquisition_start(&device, Box::new(link), &mut session, &mut sink) {
        eprintln!("Could not start the acquisition: {err}");
        std::process::exit(1)
    }

    eprintln!(
        "Capturing {} samples at {} Hz on {}. Press Ctrl+C to stop.",
        device.limit_samples, device.cur_samplerate, device.conn
    );
    session.run(&mut sink, &cancel_receiver);

    match sink.finish() {
        Ok(summary) => {
            eprintln!(
                "Wrote {} samples to {:?}.",
                summary.samples_written, args.output
            );
            if let Some(offset) = summary.trigger_offset {
                eprintln!("Trigger fired at sample {offset}.");
            }
        }
        Err(err) => {
            eprintln!("Could not finish writing {:?}: {}", args.output, err);
            std::process::exit(1)
        }
    }
}

fn configure_device(device: &mut Device, args: &cli::RecordArgs) -> Result<(), error::DriverError> {
    if let Some(rate) = args.rate {
        device.config_set(ConfigKey::Samplerate, rate)?;
    }
    if let Some(samples) = args.samples {
        device.config_set(ConfigKey::LimitSamples, samples)?;
    }
    if let Some(ratio) = args.capture_ratio {
        device.config_set(ConfigKey::CaptureRatio, ratio)?;
    }
    log::info!(
        "acquisition config: {} Hz, {} samples, {}% pre-trigger",
        device.config_get(ConfigKey::Samplerate)?,
        device.config_get(ConfigKey::LimitSamples)?,
        device.config_get(ConfigKey::CaptureRatio)?
    );

    if let Some(list) = &args.channels {
        let mut enabled = vec![false; device.channel_count()];
        for name in list.split(',') {
            let index = channel_index(name.trim())
                .filter(|&index| index < device.channel_count())
                .ok_or_else(|| {
                    error::DriverError::Argument(format!("unknown channel \"{name}\""))
                })?;
            enabled[index] = true;
        }
        for channel in &mut device.channels {
            channel.enabled = enabled[channel.index];
        }
    }
    Ok(())
}

struct CaptureSummary {
    samples_written: u64,
    trigger_offset: Option<u64>,
}

/// Writes the logic bytes of one session to a file as they arrive.
struct CaptureWriter {
    writer: BufWriter<File>,
    samples_written: u64,
    trigger_offset: Option<u64>,
    write_error: Option<std::io::Error>,
}

impl CaptureWriter {
    fn create(path: &Path) -> std::io::Result<Self> {
        Ok(CaptureWriter {
            writer: BufWriter::new(File::create(path)?),
            samples_written: 0,
            trigger_offset: None,
            write_error: None,
        })
    }

    fn finish(mut self) -> std::io::Result<CaptureSummary> {
        if let Some(err) = self.write_error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(CaptureSummary {
            samples_written: self.samples_written,
            trigger_offset: self.trigger_offset,
        })
    }
}

impl Datafeed for CaptureWriter {
    fn header(&mut self) {
        log::debug!("session started");
    }

    fn logic(&mut self, _unitsize: usize, data: &[u8]) {
        if self.write_error.is_some() {
            return;
        }
        if let Err(err) = self.writer.write_all(data) {
            self.write_error = Some(err);
            return;
        }
        self.samples_written += data.len() as u64;
    }

    fn trigger(&mut self) {
        self.trigger_offset = Some(self.samples_written);
    }

    fn end(&mut self) {
        log::debug!("session ended after {} samples", self.samples_written);
    }
}
