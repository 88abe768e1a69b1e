//! Shell scripts executed by the pipeline containers.
//!
//! The download/upload/cleanup containers run rclone; the process container
//! runs ODM itself. Each script writes its rclone config at start from the
//! injected `AWS_*` environment, because the engine filters `RCLONE_CONFIG_*`
//! variables out of container sets. The `{{workflow.name}}` markers are
//! resolved by the engine at admission, not by us.

/// Bootstraps an rclone remote named `s3` from the injected AWS environment.
const RCLONE_BOOTSTRAP: &str = r#"mkdir -p /config/rclone
cat > /config/rclone/rclone.conf <<EOF
[s3]
type = s3
provider = AWS
env_auth = true
region = ${AWS_DEFAULT_REGION:-us-east-1}
EOF
"#;

const DOWNLOAD_BODY: &str = r#"JOB_ID="{{workflow.name}}"
SRC_PATH="__READ_S3_PATH__"
DEST_DIR="/workspace/$JOB_ID/images"

echo "Downloading imagery from $SRC_PATH"
mkdir -p "$DEST_DIR"

S3_REMOTE=$(echo "$SRC_PATH" | sed 's|^s3://|s3:|')

# Exclusions first so nothing under output/ is ever pulled back down.
rclone copy "$S3_REMOTE" "$DEST_DIR" \
  --filter "- output/**" \
  --filter "- **/output/**" \
  --filter "+ *.jpg" --filter "+ *.JPG" \
  --filter "+ *.jpeg" --filter "+ *.JPEG" \
  --filter "+ *.tif" --filter "+ *.TIF" \
  --filter "+ *.tiff" --filter "+ *.TIFF" \
  --filter "+ *.zip" --filter "+ *.ZIP" \
  --filter "+ *.tar" --filter "+ *.TAR" \
  --filter "+ *.tar.gz" --filter "+ *.TAR.GZ" \
  --filter "- *"

extract_archives() {
  dir="$1"
  found=0
  for zipfile in $(find "$dir" -type f \( -name "*.zip" -o -name "*.ZIP" \)); do
    found=1
    echo "Extracting $zipfile"
    unzip -q "$zipfile" -d "$(dirname "$zipfile")" || true
    rm -f "$zipfile"
  done
  for tarfile in $(find "$dir" -type f \( -name "*.tar.gz" -o -name "*.tar" -o -name "*.TAR.GZ" -o -name "*.TAR" \)); do
    found=1
    echo "Extracting $tarfile"
    tar -xzf "$tarfile" -C "$(dirname "$tarfile")" 2>/dev/null \
      || tar -xf "$tarfile" -C "$(dirname "$tarfile")" 2>/dev/null \
      || true
    rm -f "$tarfile"
  done
  if [ "$found" = "1" ]; then
    extract_archives "$dir"
  fi
}
echo "Extracting archives"
extract_archives "$DEST_DIR"

# Drop anything that is not imagery, leaving output/ trees alone.
find "$DEST_DIR" -type f ! \( \
  -iname "*.jpg" -o -iname "*.jpeg" -o -iname "*.tif" -o -iname "*.tiff" \
\) ! -path "*/output/*" -delete
find "$DEST_DIR" -type d ! -path "*/output/*" -empty -delete

# ODM expects a flat images directory; rename collisions with a counter.
echo "Flattening directory structure"
find "$DEST_DIR" -type f \( -iname "*.jpg" -o -iname "*.jpeg" -o -iname "*.tif" -o -iname "*.tiff" \) \
  ! -path "*/output/*" | while IFS= read -r imgfile; do
  [ "$(dirname "$imgfile")" = "$DEST_DIR" ] && continue
  filename=$(basename "$imgfile")
  dest="$DEST_DIR/$filename"
  counter=1
  while [ -e "$dest" ]; do
    dest="$DEST_DIR/${filename%.*}_${counter}.${filename##*.}"
    counter=$((counter + 1))
  done
  mv "$imgfile" "$dest"
done
find "$DEST_DIR" -type d -empty -delete

echo "Download and extraction complete"
find "$DEST_DIR" -type f | wc -l | xargs echo "Total image files:"
"#;

const PROCESS_BODY: &str = r#"JOB_ID="{{workflow.name}}"
LOG_FILE="/workspace/$JOB_ID/.process.log"
echo "Processing job $JOB_ID (project __PROJECT_ID__)" | tee -a "$LOG_FILE"
odm_args="__ODM_FLAGS__ --project-path /workspace $JOB_ID"
echo "Executing: python3 run.py $odm_args" | tee -a "$LOG_FILE"
python3 run.py $odm_args 2>&1 | tee -a "$LOG_FILE"
echo "ODM processing complete" | tee -a "$LOG_FILE"
"#;

const UPLOAD_BODY: &str = r#"JOB_ID="{{workflow.name}}"
DEST_PATH="__WRITE_S3_PATH__"
SRC_DIR="/workspace/$JOB_ID"

S3_REMOTE=$(echo "$DEST_PATH" | sed 's|^s3://|s3:|')

# Probe the destination before spending time on the real upload.
TEST_FILE=$(mktemp)
echo "s3 write test $(date)" > "$TEST_FILE"
TEST_OBJECT="$S3_REMOTE.s3-write-test-$(date +%s)"
if rclone copyto "$TEST_FILE" "$TEST_OBJECT"; then
  rclone deletefile "$TEST_OBJECT" || echo "Warning: failed to delete test object"
  echo "S3 write access confirmed"
else
  echo "Warning: test write failed; continuing with upload"
fi
rm -f "$TEST_FILE"

# Inputs are already in S3; never upload them again.
rm -rf "$SRC_DIR/images"

echo "Uploading ODM products to $DEST_PATH"
if ! rclone copy "$SRC_DIR" "$S3_REMOTE" --progress; then
  echo "Upload failed"
  exit 1
fi
echo "Upload complete"
"#;

const LOG_UPLOAD_BODY: &str = r#"JOB_ID="{{workflow.name}}"
DEST_PATH="__WRITE_S3_PATH__"
WORKSPACE_DIR="/workspace/$JOB_ID"
LOG_FILE="/tmp/workflow-logs.txt"

echo "=== Workflow Logs for $JOB_ID ===" > "$LOG_FILE"
echo "Collected at: $(date -u +"%Y-%m-%d %H:%M:%S UTC")" >> "$LOG_FILE"

append_stage() {
  title="$1"
  file="$2"
  echo "" >> "$LOG_FILE"
  echo "=== $title ===" >> "$LOG_FILE"
  if [ -f "$file" ]; then
    cat "$file" >> "$LOG_FILE"
  else
    echo "log file not found" >> "$LOG_FILE"
  fi
}

append_stage "Download Stage Logs" "$WORKSPACE_DIR/.download.log"
append_stage "Process (ODM) Stage Logs" "$WORKSPACE_DIR/.process.log"

if [ -d "$WORKSPACE_DIR/$JOB_ID" ]; then
  echo "" >> "$LOG_FILE"
  echo "=== ODM-Generated Log Files ===" >> "$LOG_FILE"
  find "$WORKSPACE_DIR/$JOB_ID" -name "*_log.txt" -o -name "*.log" | while read -r logfile; do
    echo "--- $(basename "$logfile") ---" >> "$LOG_FILE"
    cat "$logfile" >> "$LOG_FILE" 2>/dev/null || echo "failed to read log file" >> "$LOG_FILE"
  done
fi

append_stage "Upload Stage Logs" "$WORKSPACE_DIR/.upload.log"

S3_REMOTE=$(echo "$DEST_PATH" | sed 's|^s3://|s3:|')
echo "Uploading workflow logs"
if rclone copyto "$LOG_FILE" "${S3_REMOTE}.workflow-logs.txt"; then
  echo "Workflow logs uploaded"
else
  echo "Warning: failed to upload workflow logs"
fi
rm -f "$LOG_FILE"
echo "Log collection complete"
"#;

/// Script for the download container: sync imagery from the read prefix,
/// extract archives, and flatten into `/workspace/<name>/images`.
pub fn download_script(read_s3_path: &str) -> String {
    format_script(DOWNLOAD_BODY.replace("__READ_S3_PATH__", read_s3_path))
}

/// Script for the process container: run ODM with the task's flags.
pub fn process_script(project_id: &str, odm_flags: &[String]) -> String {
    let body = PROCESS_BODY
        .replace("__PROJECT_ID__", project_id)
        .replace("__ODM_FLAGS__", &odm_flags.join(" "));
    format!("set -e\n{body}")
}

/// Script for the upload container: probe-write the destination, drop the
/// input images, and copy the remaining workspace to the write prefix.
pub fn upload_script(write_s3_path: &str) -> String {
    format_script(UPLOAD_BODY.replace("__WRITE_S3_PATH__", write_s3_path))
}

/// Script for the cleanup container: concatenate all stage logs and archive
/// them under the write prefix. Failure here never fails the workflow.
pub fn log_upload_script(write_s3_path: &str) -> String {
    format_script(LOG_UPLOAD_BODY.replace("__WRITE_S3_PATH__", write_s3_path))
}

fn format_script(body: String) -> String {
    format!("set -e\n{RCLONE_BOOTSTRAP}\n{body}")
}
