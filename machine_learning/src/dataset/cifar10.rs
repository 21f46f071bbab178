//! Reader for the binary distribution of CIFAR-10.
//!
//! Each file is a sequence of records of one label byte followed by `3 * 32 * 32` pixel bytes,
//! the red plane first, then green, then blue.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;

use super::Dataset;
use crate::{MlErr, Result};

/// The directory the archive extracts to.
pub const BATCHES_DIR: &str = "cifar-10-batches-bin";

/// Where the binary distribution is published.
pub const ARCHIVE_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";

pub const CHANNELS: usize = 3;
pub const SIDE: usize = 32;
pub const IMAGE_LEN: usize = CHANNELS * SIDE * SIDE;
pub const RECORD_LEN: usize = 1 + IMAGE_LEN;

pub const CLASSES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];

const TEST_FILES: [&str; 1] = ["test_batch.bin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn files(self) -> &'static [&'static str] {
        match self {
            Split::Train => &TRAIN_FILES,
            Split::Test => &TEST_FILES,
        }
    }
}

/// Whether every file of both splits is under `root/cifar-10-batches-bin`.
pub fn is_present(root: &Path) -> bool {
    let dir = root.join(BATCHES_DIR);
    [Split::Train, Split::Test]
        .into_iter()
        .flat_map(Split::files)
        .all(|file| dir.join(file).is_file())
}

/// Fetches the archive from `url` and extracts it into `root`, unless the files are already
/// there. Blocks until the transfer is done.
///
/// # Arguments
/// * `root` - The directory to extract in, created if missing.
/// * `url` - Where to get the gzipped tarball from.
///
/// # Returns
/// An error if the transfer or the extraction fails.
pub fn download(root: &Path, url: &str) -> Result<()> {
    if is_present(root) {
        log::debug!("cifar-10 already present in {}", root.display());
        return Ok(());
    }

    log::info!("downloading cifar-10 from {url}");
    let response = ureq::get(url).call().map_err(|e| MlErr::Download {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    unpack(response.into_reader(), root)?;
    log::info!("extracted cifar-10 into {}", root.display());
    Ok(())
}

/// Extracts a gzipped tarball read from `archive` into `root`, then checks every split file
/// showed up.
pub fn unpack<R: Read>(archive: R, root: &Path) -> Result<()> {
    let io_err = |source| MlErr::Io {
        path: root.to_path_buf(),
        source,
    };

    fs::create_dir_all(root).map_err(io_err)?;
    tar::Archive::new(GzDecoder::new(archive))
        .unpack(root)
        .map_err(io_err)?;

    if !is_present(root) {
        return Err(MlErr::CorruptDataset {
            path: root.join(BATCHES_DIR),
            reason: "the archive is missing split files".into(),
        });
    }

    Ok(())
}

/// Maps a raw byte to `[-1, 1]`: scale to `[0, 1]`, then normalize with mean and std 0.5.
pub fn normalize(pixel: u8) -> f32 {
    (pixel as f32 / 255.0 - 0.5) / 0.5
}

/// Loads a split from `root/cifar-10-batches-bin`.
///
/// # Arguments
/// * `root` - The directory the archive was extracted in.
/// * `split` - Which files to read.
///
/// # Returns
/// The dataset or an error if a file is missing or malformed.
pub fn load(root: &Path, split: Split) -> Result<Dataset> {
    let dir = root.join(BATCHES_DIR);
    let mut images = Vec::new();
    let mut labels = Vec::new();

    for file in split.files() {
        let path = dir.join(file);
        let bytes = fs::read(&path).map_err(|source| MlErr::Io {
            path: path.clone(),
            source,
        })?;

        parse_records(&bytes, &path, &mut images, &mut labels)?;
    }

    log::info!(images = labels.len(); "loaded cifar-10 {split:?} split");
    Dataset::new(images, labels, (CHANNELS, SIDE, SIDE), normalize)
}

/// Decodes the records in `bytes`, appending raw pixels and labels.
pub fn parse_records(
    bytes: &[u8],
    path: &Path,
    images: &mut Vec<u8>,
    labels: &mut Vec<u8>,
) -> Result<()> {
    let corrupt = |reason: String| MlErr::CorruptDataset {
        path: PathBuf::from(path),
        reason,
    };

    if bytes.len() % RECORD_LEN != 0 {
        return Err(corrupt(format!(
            "size {} is not a multiple of the {RECORD_LEN} bytes record",
            bytes.len()
        )));
    }

    let records = bytes.len() / RECORD_LEN;
    images.reserve(records * IMAGE_LEN);
    labels.reserve(records);

    for record in bytes.chunks_exact(RECORD_LEN) {
        let label = record[0];
        if label as usize >= CLASSES.len() {
            return Err(corrupt(format!("label {label} is not a class")));
        }

        labels.push(label);
        images.extend_from_slice(&record[1..]);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: u8, pixel: u8) -> Vec<u8> {
        let mut record = vec![pixel; RECORD_LEN];
        record[0] = label;
        record
    }

    #[test]
    fn normalization_spans_minus_one_to_one() {
        assert_eq!(normalize(0), -1.0);
        assert_eq!(normalize(255), 1.0);
        assert!(normalize(128).abs() < 0.01);
    }

    #[test]
    fn parses_consecutive_records() {
        let bytes = [record(3, 255), record(9, 0)].concat();
        let (mut images, mut labels) = (Vec::new(), Vec::new());

        parse_records(&bytes, Path::new("x.bin"), &mut images, &mut labels).unwrap();

        assert_eq!(labels, vec![3, 9]);
        assert_eq!(images.len(), 2 * IMAGE_LEN);
        assert_eq!(images[0], 255);
        assert_eq!(images[IMAGE_LEN], 0);
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let bytes = vec![0; RECORD_LEN + 1];
        let err = parse_records(&bytes, Path::new("x.bin"), &mut Vec::new(), &mut Vec::new())
            .unwrap_err();

        assert!(matches!(err, MlErr::CorruptDataset { .. }));
    }

    #[test]
    fn out_of_range_label_is_corrupt() {
        let err = parse_records(
            &record(10, 0),
            Path::new("x.bin"),
            &mut Vec::new(),
            &mut Vec::new(),
        )
        .unwrap_err();

        assert!(matches!(err, MlErr::CorruptDataset { .. }));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = load(Path::new("/nonexistent/cifar"), Split::Test).unwrap_err();
        assert!(matches!(err, MlErr::Io { .. }));
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cifar10-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    /// Gzipped tarball holding `files` under the batches directory, one record each.
    fn archive(files: &[&str]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);

        for file in files {
            let body = record(4, 128);
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();

            builder
                .append_data(&mut header, format!("{BATCHES_DIR}/{file}"), body.as_slice())
                .unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn unpacked_archive_loads() {
        let root = scratch_dir("unpack");
        let files: Vec<_> = TRAIN_FILES.iter().chain(&TEST_FILES).copied().collect();

        unpack(archive(&files).as_slice(), &root).unwrap();
        assert!(is_present(&root));

        let train = load(&root, Split::Train).unwrap();
        fs::remove_dir_all(&root).unwrap();

        assert_eq!(train.len(), TRAIN_FILES.len());
        assert_eq!(train.labels(), &[4; 5]);
    }

    #[test]
    fn archive_without_the_test_split_is_corrupt() {
        let root = scratch_dir("partial");

        let err = unpack(archive(&TRAIN_FILES).as_slice(), &root).unwrap_err();
        fs::remove_dir_all(&root).unwrap();

        assert!(matches!(err, MlErr::CorruptDataset { .. }));
    }

    #[test]
    fn download_is_skipped_when_the_files_exist() {
        let root = scratch_dir("present");
        let files: Vec<_> = TRAIN_FILES.iter().chain(&TEST_FILES).copied().collect();
        unpack(archive(&files).as_slice(), &root).unwrap();

        // Nothing listens there, so this only passes if nothing is fetched.
        download(&root, "http://0.0.0.0:9/cifar.tar.gz").unwrap();
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn unreachable_mirror_is_a_download_error() {
        let root = scratch_dir("unreachable");

        let err = download(&root, "http://127.0.0.1:9/cifar.tar.gz").unwrap_err();
        assert!(matches!(err, MlErr::Download { .. }), "{err}");
    }

    #[test]
    fn load_reads_every_file_of_the_split() {
        let root = std::env::temp_dir().join(format!("cifar10-test-{}", std::process::id()));
        let dir = root.join(BATCHES_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("test_batch.bin"), [record(1, 0), record(2, 0)].concat()).unwrap();

        let dataset = load(&root, Split::Test).unwrap();
        fs::remove_dir_all(&root).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.labels(), &[1, 2]);
        assert_eq!(dataset.image_shape(), (3, 32, 32));

        let batch = dataset.batch(&[0]).unwrap();
        assert!(batch.x.iter().all(|&x| x == -1.0));
    }
}
