use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{
	fs::{create_dir_all, remove_file, rename, File},
	io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, info, warn};

use settlr_types::{
	offline_adapter, prelude::ClResult, prelude::Error, types::ClientKey,
	utils::stable_client_hash,
};

/// Calculates the path of the directory for a client blob
fn obj_dir(base_dir: &Path, client: &ClientKey) -> PathBuf {
	let hash = stable_client_hash(client);
	PathBuf::from(base_dir).join(&hash[0..2])
}

fn obj_file_path(base_dir: &Path, client: &ClientKey) -> PathBuf {
	let hash = stable_client_hash(client);
	obj_dir(base_dir, client).join(format!("{}.bin", hash))
}

fn obj_tmp_file_path(base_dir: &Path, client: &ClientKey) -> PathBuf {
	obj_dir(base_dir, client).join(format!("tmp-{}", uuid::Uuid::new_v4().simple()))
}

#[derive(Debug)]
pub struct OfflineAdapterFs {
	base_dir: Box<Path>,
}

impl OfflineAdapterFs {
	pub async fn new(base_dir: Box<Path>) -> Result<Self, Error> {
		create_dir_all(&base_dir).await?;
		Ok(Self { base_dir })
	}

	/// Where the blob of a client lives (diagnostics)
	pub fn blob_path(&self, client: &ClientKey) -> PathBuf {
		obj_file_path(&self.base_dir, client)
	}
}

#[async_trait]
impl offline_adapter::OfflineAdapter for OfflineAdapterFs {
	async fn write_blob(&self, client: &ClientKey, data: &[u8]) -> ClResult<()> {
		create_dir_all(obj_dir(&self.base_dir, client)).await?;

		let tmp_path = obj_tmp_file_path(&self.base_dir, client);
		let res = async {
			let mut file = File::create(&tmp_path).await?;
			file.write_all(data).await?;
			file.sync_all().await?;
			rename(&tmp_path, obj_file_path(&self.base_dir, client)).await?;
			Ok::<(), Error>(())
		}
		.await;

		if let Err(e) = res {
			warn!(client = %client, "offline blob write failed, removing tmpfile: {}", e);
			let _ignore = remove_file(&tmp_path).await;
			return Err(e);
		}
		debug!(client = %client, "offline blob written ({} bytes)", data.len());
		Ok(())
	}

	async fn read_blob(&self, client: &ClientKey) -> ClResult<Option<Box<[u8]>>> {
		let mut file = match File::open(obj_file_path(&self.base_dir, client)).await {
			Ok(file) => file,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		let mut buf: Vec<u8> = Vec::new();
		file.read_to_end(&mut buf).await?;

		Ok(Some(buf.into_boxed_slice()))
	}

	async fn remove_blob(&self, client: &ClientKey) -> ClResult<()> {
		match remove_file(obj_file_path(&self.base_dir, client)).await {
			Ok(()) => {
				info!(client = %client, "offline blob removed");
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}


// vim: ts=4
