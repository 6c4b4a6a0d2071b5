use std::{
    cmp::min,
    fmt,
    fs::File,
    io::{Read, Write},
    path::Path,
    sync::{mpsc::sync_channel, Arc},
    thread,
};

use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use size::Size;
use wia::{version_string, Archive, Compression, Result, ResultContext};

use crate::util::{
    digest::{digest_thread, DigestResult},
    display,
};

fn head_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

pub fn print_header(archive: &Archive) {
    let meta = archive.meta();
    print!("Format: WIA {}", version_string(meta.version));
    if meta.version_compatible != meta.version {
        print!(" (compatible with {})", version_string(meta.version_compatible));
    }
    println!();
    println!("Disc type: {}", meta.disc_type);
    if meta.compression == Compression::None {
        println!("Compression: None");
    } else {
        println!("Compression: {} (level {})", meta.compression, meta.compression_level);
    }
    println!("Chunk size: {}", Size::from_bytes(meta.chunk_size));
    println!("Disc size: {} ({:#X})", Size::from_bytes(meta.disc_size), meta.disc_size);
    println!("Archive size: {} ({:#X})", Size::from_bytes(meta.archive_size), meta.archive_size);
    if meta.archive_size != meta.stream_len {
        println!("[!] File is {:#X} bytes", meta.stream_len);
    }

    let head = &archive.disc().disc_head;
    println!();
    println!("Title: {}", head_str(&head[0x20..0x60]));
    println!("Game ID: {}", head_str(&head[..6]));
    println!("Disc {}, Revision {}", head[6] as u32 + 1, head[7]);
}

/// Reads the full disc image, hashing it and optionally writing it to `out_file`.
pub fn read_and_digest(archive: &Archive, out_file: Option<&Path>) -> Result<Vec<DigestResult>> {
    let disc_size = archive.disc_size();
    let mut stream = archive.open_stream();

    let mut file = if let Some(out_file) = out_file {
        Some(
            File::create(out_file)
                .with_context(|| format!("Creating file {}", display(out_file)))?,
        )
    } else {
        None
    };

    let pb = ProgressBar::new(disc_size);
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .unwrap()
        .with_key("eta", |state: &ProgressState, w: &mut dyn fmt::Write| {
            write!(w, "{:.1}s", state.eta().as_secs_f64()).unwrap()
        })
        .progress_chars("#>-"));

    const BUFFER_SIZE: usize = 0x200000;
    let digest_threads =
        vec![digest_thread::<crc32fast::Hasher>(), digest_thread::<sha1::Sha1>()];

    let (w_tx, w_rx) = sync_channel::<Arc<[u8]>>(1);
    let w_thread = thread::spawn(move || {
        let mut total_written = 0u64;
        while let Ok(data) = w_rx.recv() {
            if let Some(file) = &mut file {
                file.write_all(data.as_ref())
                    .with_context(|| {
                        format!("Writing {} bytes at offset {}", data.len(), total_written)
                    })
                    .unwrap();
            }
            total_written += data.len() as u64;
            pb.set_position(total_written);
        }
        if let Some(mut file) = file {
            file.flush().context("Flushing output file").unwrap();
        }
        pb.finish();
    });

    let mut total_read = 0u64;
    let mut buf = vec![0u8; BUFFER_SIZE];
    while total_read < disc_size {
        let read = min(BUFFER_SIZE as u64, disc_size - total_read) as usize;
        stream.read_exact(&mut buf[..read]).with_context(|| {
            format!("Reading {} bytes at disc offset {}", read, total_read)
        })?;

        let arc = Arc::<[u8]>::from(&buf[..read]);
        for (tx, _) in &digest_threads {
            tx.send(arc.clone()).map_err(|_| "Sending data to hash thread")?;
        }
        w_tx.send(arc).map_err(|_| "Sending data to write thread")?;
        total_read += read as u64;
    }
    drop(w_tx); // Close channel
    w_thread.join().unwrap();

    if let Some(path) = out_file {
        println!("Wrote {} to {}", Size::from_bytes(total_read), display(path));
    }

    let mut results = Vec::with_capacity(digest_threads.len());
    for (tx, handle) in digest_threads {
        drop(tx); // Close channel
        results.push(handle.join().unwrap());
    }
    Ok(results)
}

pub fn print_digests(results: &[DigestResult]) {
    for result in results {
        println!("{}: {}", result.name(), result);
    }
}
