//! Field names shared by extraction, normalization and diagnostics.

// Build banner
pub const BUILD_AND_SPECS: &str = "build_and_specs";
pub const BUILD_VERSION: &str = "build_version";
pub const BUILD_NUMBER: &str = "build_number";
pub const BUILD_COMMIT: &str = "build_commit";
pub const BUILD_BRANCH: &str = "build_branch";
pub const FW_VERSION_INSTALLED: &str = "fw_version_installed";

// Host
pub const CPU_MODEL: &str = "cpu_model";
pub const CPU_SPEED: &str = "cpu_speed";
pub const THREAD_COUNT: &str = "thread_count";
pub const MEMORY_AMOUNT: &str = "memory_amount";
pub const WIN_PATH: &str = "win_path";
pub const LIN_PATH: &str = "lin_path";
pub const OS_PATH: &str = "os_path";

// Game
pub const GAME_TITLE: &str = "game_title";
pub const SERIAL: &str = "serial";
pub const GAME_CATEGORY: &str = "game_category";
pub const LDR_GAME_SERIAL: &str = "ldr_game_serial";
pub const RAP_FILE: &str = "rap_file";
pub const PIRACY_CONTEXT: &str = "piracy_context";

// Settings
pub const SPU_THREADS: &str = "spu_threads";
pub const SPU_SECONDARY_CORES: &str = "spu_secondary_cores";
pub const THREAD_SCHEDULER: &str = "thread_scheduler";
pub const LIB_LOADER: &str = "lib_loader";
pub const LIBRARY_LIST: &str = "library_list";
pub const RENDERER: &str = "renderer";
pub const RESOLUTION_SCALE: &str = "resolution_scale";
pub const STRICT_RENDERING_MODE: &str = "strict_rendering_mode";
pub const AF_OVERRIDE: &str = "af_override";
pub const VERTEX_CACHE: &str = "vertex_cache";

// GPU
pub const GPU_INFO: &str = "gpu_info";
pub const GPU_AVAILABLE_INFO: &str = "gpu_available_info";
pub const DRIVER_VERSION_INFO: &str = "driver_version_info";
pub const DRIVER_MANUF: &str = "driver_manuf";
pub const DRIVER_MANUF_NEW: &str = "driver_manuf_new";
pub const DRIVER_VERSION: &str = "driver_version";
pub const DRIVER_VERSION_NEW: &str = "driver_version_new";
pub const OPENGL_VERSION: &str = "opengl_version";
pub const VULKAN_GPU: &str = "vulkan_gpu";
pub const D3D_GPU: &str = "d3d_gpu";
pub const VULKAN_FOUND_DEVICE: &str = "vulkan_found_device";
pub const VULKAN_COMPATIBLE_DEVICE_NAME: &str = "vulkan_compatible_device_name";
pub const VULKAN_INITIALIZED_DEVICE: &str = "vulkan_initialized_device";
pub const VULKAN_DRIVER_VERSION_RAW: &str = "vulkan_driver_version_raw";

/// Fields that may legitimately match several times; their values are
/// kept as a newline-separated list.
pub const LIST_FIELDS: &[&str] = &[VULKAN_FOUND_DEVICE, VULKAN_COMPATIBLE_DEVICE_NAME, RAP_FILE];

pub const ENABLED_MARK: &str = "[x]";
pub const DISABLED_MARK: &str = "[ ]";
