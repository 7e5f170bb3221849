use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayViewD, Axis, IxDyn};
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::Session;
use ort::value::Value;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use crate::application::ports::DetectorPort;
use crate::domain::detection::{ClassNames, RawDetection};
use crate::domain::model::{Device, ModelId, YoloParams};

/// Motor YOLO sobre ONNX Runtime.
/// `Session::run` necesita acceso exclusivo, así que la sesión va detrás de un
/// `Mutex` y las predicciones concurrentes se serializan.
pub struct OnnxYoloEngine {
    session: Arc<Mutex<Session>>,
    names: ClassNames,
    device: Device,
}

impl OnnxYoloEngine {
    pub fn load(model: &ModelId, device: Device) -> Result<Self> {
        let mut builder = Session::builder()?.with_intra_threads(4)?;

        // CUDA es opcional: si no está disponible continuamos en CPU.
        let device = match device {
            Device::Cuda(id) => {
                let cuda = CUDAExecutionProvider::default().with_device_id(id);
                let registered = if cuda.is_available().unwrap_or(false) {
                    builder.clone().with_execution_providers([cuda.build()]).ok()
                } else {
                    None
                };
                match registered {
                    Some(b) => {
                        builder = b;
                        Device::Cuda(id)
                    }
                    None => {
                        warn!(requested = %device, "CUDA not available; falling back to CPU.");
                        Device::Cpu
                    }
                }
            }
            Device::Cpu => Device::Cpu,
        };

        let model_bytes = fs::read(&model.onnx_path)
            .with_context(|| format!("no se pudo leer el modelo {}", model.onnx_path))?;
        let session = builder.commit_from_memory(&model_bytes)?;

        let names = match read_class_names(&session) {
            Some(names) => names,
            None => {
                warn!(model = %model.name, "Model has no class names metadata; using numeric labels");
                ClassNames::Numeric
            }
        };

        info!(model = %model.onnx_path, device = %device, classes = ?names.known_count(), "Loaded model");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            names,
            device,
        })
    }

    /// Dispositivo efectivo tras el fallback.
    pub fn device(&self) -> Device {
        self.device
    }
}

#[async_trait]
impl DetectorPort for OnnxYoloEngine {
    async fn predict(&self, image: RgbImage, params: &YoloParams) -> Result<Vec<RawDetection>> {
        let session = Arc::clone(&self.session);
        let params = params.clone();

        tokio::task::spawn_blocking(move || {
            let mut session = lock_recovering(&session);
            run_session(&mut session, &image, &params)
        })
        .await
        .context("la tarea de inferencia terminó de forma inesperada")?
    }

    fn class_names(&self) -> &ClassNames {
        &self.names
    }
}

/// Un pánico durante una inferencia no debe inutilizar la sesión para las
/// siguientes peticiones: se recupera el guard del mutex envenenado.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_class_names(session: &Session) -> Option<ClassNames> {
    let metadata = session.metadata().ok()?;
    let raw = metadata.custom("names").ok()??;
    ClassNames::parse_ultralytics(&raw)
}

fn run_session(session: &mut Session, rgb: &RgbImage, params: &YoloParams) -> Result<Vec<RawDetection>> {
    let imgsz = params.input_size as i64;
    let (input, letterbox) = preprocess(rgb, params.input_size);
    let input_tensor = Value::from_array((vec![1, 3, imgsz, imgsz], input.into_raw_vec()))?;

    let outputs = session.run(ort::inputs![input_tensor])?;
    let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;
    let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();

    decode_output(&dims, data_out, &letterbox, params)
}

/// Gris de relleno del letterbox de Ultralytics.
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Geometría del letterbox: la imagen se escala conservando la proporción y se
/// centra en un lienzo `size × size` con bandas de relleno.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub gain: f32,
    pub left: u32,
    pub top: u32,
    pub resized: (u32, u32),
    pub original: (u32, u32),
}

impl Letterbox {
    pub fn new(width: u32, height: u32, size: u32) -> Self {
        let gain = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_w = ((width as f32 * gain).round() as u32).clamp(1, size);
        let new_h = ((height as f32 * gain).round() as u32).clamp(1, size);
        // mismo redondeo que Ultralytics: el píxel impar va abajo/derecha
        let dw = (size - new_w) as f32 / 2.0;
        let dh = (size - new_h) as f32 / 2.0;
        Self {
            gain,
            left: (dw - 0.1).round().max(0.0) as u32,
            top: (dh - 0.1).round().max(0.0) as u32,
            resized: (new_w, new_h),
            original: (width, height),
        }
    }

    /// Lleva una caja del espacio del modelo a píxeles de la imagen original.
    fn unpad(&self, [x1, y1, x2, y2]: [f32; 4]) -> [f32; 4] {
        let (w, h) = (self.original.0 as f32, self.original.1 as f32);
        let (left, top) = (self.left as f32, self.top as f32);
        [
            ((x1 - left) / self.gain).clamp(0.0, w),
            ((y1 - top) / self.gain).clamp(0.0, h),
            ((x2 - left) / self.gain).clamp(0.0, w),
            ((y2 - top) / self.gain).clamp(0.0, h),
        ]
    }
}

/// Letterbox a `size × size` y tensor NCHW normalizado a [0, 1].
pub fn preprocess(rgb: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let imgsz = size as usize;
    let letterbox = Letterbox::new(rgb.width(), rgb.height(), size);
    let (new_w, new_h) = letterbox.resized;
    let resized = image::imageops::resize(rgb, new_w, new_h, FilterType::Triangle);

    let mut input = Array4::<f32>::from_elem((1, 3, imgsz, imgsz), PAD_VALUE);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (px, py) = ((x + letterbox.left) as usize, (y + letterbox.top) as usize);
        input[[0, 0, py, px]] = pixel[0] as f32 / 255.0;
        input[[0, 1, py, px]] = pixel[1] as f32 / 255.0;
        input[[0, 2, py, px]] = pixel[2] as f32 / 255.0;
    }
    (input, letterbox)
}

/// Interpreta la salida del modelo y devuelve cajas en píxeles de la imagen original.
///
/// Formatos soportados:
/// - end-to-end (YOLOv10): `[1, N, 6]` con filas `x1, y1, x2, y2, score, class`;
/// - denso (YOLOv8/11): `[1, 4 + nc, N]` con `cx, cy, w, h` y una puntuación por
///   clase; aquí se aplica NMS por clase.
pub fn decode_output(
    dims: &[usize],
    data: &[f32],
    letterbox: &Letterbox,
    params: &YoloParams,
) -> Result<Vec<RawDetection>> {
    if dims.len() != 3 || dims[0] != 1 {
        bail!("forma de salida inesperada: {dims:?}");
    }

    let array_view = ArrayViewD::from_shape(IxDyn(dims), data)?;
    let view = array_view.index_axis(Axis(0), 0);

    let scale = |bbox: [f32; 4]| letterbox.unpad(bbox);

    let mut detections = Vec::new();

    if dims[2] == 6 {
        for row in view.outer_iter() {
            let score = row[[4]];
            if score > params.conf_threshold {
                detections.push(RawDetection {
                    class_id: row[[5]].max(0.0) as usize,
                    confidence: score,
                    bbox: scale([row[[0]], row[[1]], row[[2]], row[[3]]]),
                });
            }
        }
    } else {
        if dims[1] <= 4 {
            bail!("salida densa sin puntuaciones de clase: {dims:?}");
        }
        let num_candidates = dims[2];
        for i in 0..num_candidates {
            let scores = view.slice(s![4.., i]);
            let Some((class_id, &max_score)) = scores
                .indexed_iter()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
            else {
                continue;
            };

            if max_score > params.conf_threshold {
                let cx = view[[0, i]];
                let cy = view[[1, i]];
                let w = view[[2, i]];
                let h = view[[3, i]];

                detections.push(RawDetection {
                    class_id,
                    confidence: max_score,
                    bbox: scale([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]),
                });
            }
        }
        detections = nms(detections, params.iou_threshold);
    }

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections.truncate(params.max_detections);
    Ok(detections)
}

/// NMS voraz por clase.
fn nms(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(candidates.len());
    for cand in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(&k.bbox, &cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn params() -> YoloParams {
        YoloParams::default()
    }

    /// Construye una salida densa `[1, 4 + nc, n]` a partir de columnas.
    fn dense(nc: usize, columns: &[[f32; 6]]) -> (Vec<usize>, Vec<f32>) {
        assert_eq!(nc, 2, "el helper solo cubre dos clases");
        let n = columns.len();
        let rows = 4 + nc;
        let mut data = vec![0.0; rows * n];
        for (i, col) in columns.iter().enumerate() {
            for (r, v) in col.iter().enumerate() {
                data[r * n + i] = *v;
            }
        }
        (vec![1, rows, n], data)
    }

    #[test]
    fn end_to_end_output_is_filtered_and_scaled() {
        let data = vec![
            10.0, 100.0, 100.0, 200.0, 0.91, 0.0, //
            0.0, 0.0, 50.0, 50.0, 0.10, 1.0, //
            320.0, 320.0, 640.0, 640.0, 0.50, 1.0,
        ];
        let dets = decode_output(&[1, 3, 6], &data, &Letterbox::new(1280, 960, 640), &params()).unwrap();

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_id, 0);
        assert_eq!(dets[0].confidence, 0.91);
        // 1280×960 → ganancia 0.5 y 80 px de banda arriba
        assert_eq!(dets[0].bbox, [20.0, 40.0, 200.0, 240.0]);
        assert_eq!(dets[1].bbox, [640.0, 480.0, 1280.0, 960.0]);
    }

    #[test]
    fn identity_scale_keeps_boxes() {
        let data = vec![10.0, 20.0, 100.0, 200.0, 0.91, 0.0];
        let dets = decode_output(&[1, 1, 6], &data, &Letterbox::new(640, 640, 640), &params()).unwrap();
        assert_eq!(dets[0].bbox, [10.0, 20.0, 100.0, 200.0]);
    }

    #[test]
    fn dense_output_applies_class_aware_nms() {
        let (dims, data) = dense(
            2,
            &[
                // cx, cy, w, h, score_c0, score_c1
                [100.0, 100.0, 50.0, 50.0, 0.90, 0.05],
                [102.0, 101.0, 50.0, 50.0, 0.80, 0.05], // solapa con la primera, misma clase
                [101.0, 100.0, 50.0, 50.0, 0.05, 0.60], // solapa pero otra clase
                [400.0, 400.0, 20.0, 20.0, 0.20, 0.10], // por debajo del umbral
            ],
        );
        let dets = decode_output(&dims, &data, &Letterbox::new(640, 640, 640), &params()).unwrap();

        assert_eq!(dets.len(), 2);
        assert_eq!((dets[0].class_id, dets[0].confidence), (0, 0.90));
        assert_eq!((dets[1].class_id, dets[1].confidence), (1, 0.60));
        assert_eq!(dets[0].bbox, [75.0, 75.0, 125.0, 125.0]);
    }

    #[test]
    fn boxes_are_clipped_to_image() {
        let data = vec![-5.0, -5.0, 700.0, 700.0, 0.9, 0.0];
        let dets = decode_output(&[1, 1, 6], &data, &Letterbox::new(640, 480, 640), &params()).unwrap();
        assert_eq!(dets[0].bbox, [0.0, 0.0, 640.0, 480.0]);
    }

    #[test]
    fn results_are_truncated_to_max_detections() {
        let mut data = Vec::new();
        for i in 0..10 {
            data.extend_from_slice(&[0.0, 0.0, 10.0, 10.0, 0.3 + i as f32 * 0.05, 0.0]);
        }
        let p = YoloParams { max_detections: 4, ..params() };
        let dets = decode_output(&[1, 10, 6], &data, &Letterbox::new(640, 640, 640), &p).unwrap();
        assert_eq!(dets.len(), 4);
        assert!(dets.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn empty_output_yields_no_detections() {
        let dets = decode_output(&[1, 0, 6], &[], &Letterbox::new(640, 640, 640), &params()).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn rejects_unexpected_shapes() {
        assert!(decode_output(&[2, 3], &[0.0; 6], &Letterbox::new(640, 640, 640), &params()).is_err());
        assert!(decode_output(&[1, 4, 2], &[0.0; 8], &Letterbox::new(640, 640, 640), &params()).is_err());
        assert!(decode_output(&[1, 1, 6], &[0.0; 3], &Letterbox::new(640, 640, 640), &params()).is_err());
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        assert_eq!(iou(&[0.0, 0.0, 10.0, 10.0], &[0.0, 0.0, 10.0, 10.0]), 1.0);
        assert_eq!(iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]), 0.0);
        assert_eq!(iou(&[0.0; 4], &[0.0; 4]), 0.0);
    }

    #[test]
    fn preprocess_letterboxes_into_normalized_nchw() {
        let img = RgbImage::from_pixel(40, 30, Rgb([255, 0, 51]));
        let (input, letterbox) = preprocess(&img, 64);
        assert_eq!(input.shape(), &[1, 3, 64, 64]);
        assert_eq!(letterbox.resized, (64, 48));
        assert_eq!((letterbox.left, letterbox.top), (0, 8));

        assert_eq!(input[[0, 0, 10, 10]], 1.0);
        assert_eq!(input[[0, 1, 10, 10]], 0.0);
        assert!((input[[0, 2, 10, 10]] - 0.2).abs() < 1e-6);

        // bandas de relleno arriba y abajo
        for row in [0, 7, 56, 63] {
            assert_eq!(input[[0, 0, row, 20]], PAD_VALUE);
        }
    }

    #[test]
    fn letterbox_keeps_aspect_ratio() {
        let lb = Letterbox::new(1280, 720, 640);
        assert_eq!(lb.gain, 0.5);
        assert_eq!(lb.resized, (640, 360));
        assert_eq!((lb.left, lb.top), (0, 140));

        // padding impar: el píxel sobrante va abajo
        let lb = Letterbox::new(100, 83, 100);
        assert_eq!(lb.resized, (100, 83));
        assert_eq!(lb.top, 8);

        let square = Letterbox::new(640, 640, 640);
        assert_eq!((square.gain, square.left, square.top), (1.0, 0, 0));
    }

    #[test]
    fn boxes_on_wide_images_are_unpadded() {
        // 1280×720: la banda superior de 140 px no debe desplazar la caja
        let data = vec![100.0, 190.0, 200.0, 240.0, 0.8, 0.0];
        let dets = decode_output(&[1, 1, 6], &data, &Letterbox::new(1280, 720, 640), &params()).unwrap();
        assert_eq!(dets[0].bbox, [200.0, 100.0, 400.0, 200.0]);
    }

    #[test]
    fn poisoned_session_lock_is_recovered() {
        let mutex = Arc::new(Mutex::new(7u32));
        let poisoner = Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("fallo durante la inferencia");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*lock_recovering(&mutex), 7);
    }
}
