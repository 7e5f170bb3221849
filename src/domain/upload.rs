/// Archivo recibido en `/detect`. Los valores declarados vienen del cliente
/// y no se validan contra el contenido.
#[derive(Debug, Clone, Default)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}
